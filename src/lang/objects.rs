//! The object and list surface the interpreter runs against.
//!
//! The interpreter never owns objects or lists; it holds handles and goes
//! through [`ObjectModel`] for everything else. [`MemoryObjects`] is a small
//! in-memory implementation for the CLI and tests.

use std::collections::HashMap;
use std::rc::Rc;

use crate::lang::value::{ListRef, ObjectRef, ProcId, Value};
use crate::runtime::runtime_error::{
    RuntimeError, index_out_of_bounds, internal, type_error, undefined,
};

pub trait ObjectModel {
    /// Create an object of `type_path` with its declared fields initialized.
    fn create_object(&mut self, type_path: &str) -> Result<ObjectRef, RuntimeError>;

    /// Delete an object. Deleting twice is a no-op.
    fn delete_object(&mut self, obj: ObjectRef);

    fn is_live(&self, obj: ObjectRef) -> bool;

    fn type_of(&self, obj: ObjectRef) -> Option<Rc<str>>;

    /// Whether `type_path` is `ancestor` or derives from it.
    fn is_subtype(&self, type_path: &str, ancestor: &str) -> bool {
        type_path == ancestor
            || (type_path.starts_with(ancestor)
                && type_path.as_bytes().get(ancestor.len()) == Some(&b'/'))
    }

    fn get_field(&self, obj: ObjectRef, name: &str) -> Result<Value, RuntimeError>;

    fn set_field(&mut self, obj: ObjectRef, name: &str, value: Value) -> Result<(), RuntimeError>;

    fn get_global(&self, id: u32) -> Result<Value, RuntimeError>;

    fn set_global(&mut self, id: u32, value: Value) -> Result<(), RuntimeError>;

    /// Make `id` callable by `name` on instances of `type_path` and its
    /// subtypes.
    fn register_proc(&mut self, type_path: &str, name: &str, id: ProcId);

    /// Find the most derived proc called `name` on the object's type.
    fn resolve_proc(&self, obj: ObjectRef, name: &str) -> Option<ProcId>;

    /// Walk all object slots in creation order. `None` past the end,
    /// `Some(None)` for a deleted slot.
    fn instance_at(&self, index: usize) -> Option<Option<ObjectRef>>;

    fn create_list(&mut self, items: Vec<Value>) -> ListRef;

    fn list_append(&mut self, list: ListRef, value: Value) -> Result<(), RuntimeError>;

    /// Remove the last element equal to `value`, if any.
    fn list_remove(&mut self, list: ListRef, value: &Value) -> Result<(), RuntimeError>;

    fn list_contains(&self, list: ListRef, value: &Value) -> Result<bool, RuntimeError>;

    /// 1-based.
    fn list_get(&self, list: ListRef, index: &Value) -> Result<Value, RuntimeError>;

    /// 1-based.
    fn list_set(&mut self, list: ListRef, index: &Value, value: Value) -> Result<(), RuntimeError>;

    fn list_len(&self, list: ListRef) -> Result<usize, RuntimeError>;

    /// Copy of the list's current elements.
    fn list_snapshot(&self, list: ListRef) -> Result<Vec<Value>, RuntimeError>;

    /// The `\ref` text of a value, used by string interpolation.
    fn reference_id(&self, value: &Value) -> String {
        match value {
            Value::Object(obj) => format!("[0x{:x}]", 0x0200_0000 + obj.0),
            Value::List(list) => format!("[0x{:x}]", 0x0F00_0000 + list.0),
            other => other.to_string(),
        }
    }

    /// How an object renders inside an interpolated string.
    fn display_name(&self, obj: ObjectRef) -> String {
        match self.get_field(obj, "name") {
            Ok(Value::String(name)) => name.to_string(),
            _ => self
                .type_of(obj)
                .map(|path| path.rsplit('/').next().unwrap_or_default().to_string())
                .unwrap_or_default(),
        }
    }
}

// ─────────────────────────── In-memory implementation ───────────────────────────

#[derive(Debug)]
struct ObjectData {
    type_path: Rc<str>,
    fields: HashMap<String, Value>,
}

#[derive(Debug, Default)]
struct TypeData {
    fields: Vec<(String, Value)>,
    procs: HashMap<String, ProcId>,
}

#[derive(Debug, Default)]
pub struct MemoryObjects {
    types: HashMap<String, TypeData>,
    objects: Vec<Option<ObjectData>>,
    lists: Vec<Vec<Value>>,
    globals: Vec<Value>,
}

impl MemoryObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_type(&mut self, type_path: &str) {
        self.types.entry(type_path.to_string()).or_default();
    }

    /// Declare a field with its initial value on a type.
    pub fn define_field(&mut self, type_path: &str, name: &str, initial: Value) {
        let ty = self.types.entry(type_path.to_string()).or_default();
        ty.fields.retain(|(existing, _)| existing != name);
        ty.fields.push((name.to_string(), initial));
    }

    /// The type followed by its ancestors, most derived first.
    fn lineage(type_path: &str) -> impl Iterator<Item = &str> {
        let mut current = Some(type_path);
        std::iter::from_fn(move || {
            let path = current?;
            current = match path.rfind('/') {
                Some(0) | None => None,
                Some(i) => Some(&path[..i]),
            };
            Some(path)
        })
    }

    fn object(&self, obj: ObjectRef) -> Result<&ObjectData, RuntimeError> {
        self.objects
            .get(obj.0 as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| type_error(format!("object {} has been deleted", obj.0)))
    }

    fn list(&self, list: ListRef) -> Result<&Vec<Value>, RuntimeError> {
        self.lists
            .get(list.0 as usize)
            .ok_or_else(|| internal(format!("dangling list handle {}", list.0)))
    }

    fn list_mut(&mut self, list: ListRef) -> Result<&mut Vec<Value>, RuntimeError> {
        self.lists
            .get_mut(list.0 as usize)
            .ok_or_else(|| internal(format!("dangling list handle {}", list.0)))
    }
}

fn list_position(index: &Value, len: usize) -> Result<usize, RuntimeError> {
    match index.as_integer() {
        Some(i) if i >= 1 && (i as usize) <= len => Ok(i as usize - 1),
        Some(_) => Err(index_out_of_bounds(index, len)),
        None => Err(type_error(format!(
            "list index must be a number, got {}",
            index.type_name()
        ))),
    }
}

impl ObjectModel for MemoryObjects {
    fn create_object(&mut self, type_path: &str) -> Result<ObjectRef, RuntimeError> {
        if !Self::lineage(type_path).any(|t| self.types.contains_key(t)) {
            return Err(undefined("type", type_path));
        }

        let mut fields = HashMap::new();
        let ancestry: Vec<&str> = Self::lineage(type_path).collect();
        for ty in ancestry.iter().rev() {
            if let Some(data) = self.types.get(*ty) {
                for (name, initial) in &data.fields {
                    fields.insert(name.clone(), initial.clone());
                }
            }
        }

        let obj = ObjectRef(self.objects.len() as u32);
        self.objects.push(Some(ObjectData {
            type_path: Rc::from(type_path),
            fields,
        }));
        Ok(obj)
    }

    fn delete_object(&mut self, obj: ObjectRef) {
        if let Some(slot) = self.objects.get_mut(obj.0 as usize) {
            *slot = None;
        }
    }

    fn is_live(&self, obj: ObjectRef) -> bool {
        matches!(self.objects.get(obj.0 as usize), Some(Some(_)))
    }

    fn type_of(&self, obj: ObjectRef) -> Option<Rc<str>> {
        self.object(obj).ok().map(|data| data.type_path.clone())
    }

    fn get_field(&self, obj: ObjectRef, name: &str) -> Result<Value, RuntimeError> {
        let data = self.object(obj)?;
        if name == "type" {
            return Ok(Value::Path(data.type_path.clone()));
        }
        data.fields
            .get(name)
            .cloned()
            .ok_or_else(|| undefined("field", name))
    }

    fn set_field(&mut self, obj: ObjectRef, name: &str, value: Value) -> Result<(), RuntimeError> {
        let data = self
            .objects
            .get_mut(obj.0 as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| type_error(format!("object {} has been deleted", obj.0)))?;
        match data.fields.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(undefined("field", name)),
        }
    }

    fn get_global(&self, id: u32) -> Result<Value, RuntimeError> {
        self.globals
            .get(id as usize)
            .cloned()
            .ok_or_else(|| undefined("global", id.to_string()))
    }

    /// Setting past the end declares the global.
    fn set_global(&mut self, id: u32, value: Value) -> Result<(), RuntimeError> {
        let index = id as usize;
        if index >= self.globals.len() {
            self.globals.resize(index + 1, Value::Null);
        }
        self.globals[index] = value;
        Ok(())
    }

    fn register_proc(&mut self, type_path: &str, name: &str, id: ProcId) {
        self.types
            .entry(type_path.to_string())
            .or_default()
            .procs
            .insert(name.to_string(), id);
    }

    fn resolve_proc(&self, obj: ObjectRef, name: &str) -> Option<ProcId> {
        let data = self.object(obj).ok()?;
        Self::lineage(&data.type_path)
            .find_map(|ty| self.types.get(ty).and_then(|t| t.procs.get(name)).copied())
    }

    fn instance_at(&self, index: usize) -> Option<Option<ObjectRef>> {
        self.objects
            .get(index)
            .map(|slot| slot.as_ref().map(|_| ObjectRef(index as u32)))
    }

    /// Lists are never freed; every list created lives until the
    /// `MemoryObjects` is dropped.
    fn create_list(&mut self, items: Vec<Value>) -> ListRef {
        self.lists.push(items);
        ListRef(self.lists.len() as u32 - 1)
    }

    fn list_append(&mut self, list: ListRef, value: Value) -> Result<(), RuntimeError> {
        self.list_mut(list)?.push(value);
        Ok(())
    }

    fn list_remove(&mut self, list: ListRef, value: &Value) -> Result<(), RuntimeError> {
        let items = self.list_mut(list)?;
        if let Some(pos) = items.iter().rposition(|item| item.equals(value)) {
            items.remove(pos);
        }
        Ok(())
    }

    fn list_contains(&self, list: ListRef, value: &Value) -> Result<bool, RuntimeError> {
        Ok(self.list(list)?.iter().any(|item| item.equals(value)))
    }

    fn list_get(&self, list: ListRef, index: &Value) -> Result<Value, RuntimeError> {
        let items = self.list(list)?;
        let pos = list_position(index, items.len())?;
        Ok(items[pos].clone())
    }

    fn list_set(&mut self, list: ListRef, index: &Value, value: Value) -> Result<(), RuntimeError> {
        let items = self.list_mut(list)?;
        let pos = list_position(index, items.len())?;
        items[pos] = value;
        Ok(())
    }

    fn list_len(&self, list: ListRef) -> Result<usize, RuntimeError> {
        Ok(self.list(list)?.len())
    }

    fn list_snapshot(&self, list: ListRef) -> Result<Vec<Value>, RuntimeError> {
        Ok(self.list(list)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> MemoryObjects {
        let mut objects = MemoryObjects::new();
        objects.define_field("/mob", "health", Value::Integer(100));
        objects.define_field("/mob/player", "name", Value::string("hero"));
        objects.register_proc("/mob", "attack", ProcId(1));
        objects.register_proc("/mob/player", "attack", ProcId(2));
        objects.register_proc("/mob", "heal", ProcId(3));
        objects
    }

    #[test]
    fn test_fields_inherit() {
        let mut objects = world();
        let player = objects.create_object("/mob/player").unwrap();
        assert_eq!(objects.get_field(player, "health").unwrap(), Value::Integer(100));
        objects.set_field(player, "health", Value::Integer(5)).unwrap();
        assert_eq!(objects.get_field(player, "health").unwrap(), Value::Integer(5));
        assert_eq!(objects.get_field(player, "type").unwrap(), Value::path("/mob/player"));
        assert!(objects.get_field(player, "mana").is_err());
        assert!(objects.set_field(player, "mana", Value::Null).is_err());
    }

    #[test]
    fn test_proc_resolution_prefers_most_derived() {
        let mut objects = world();
        let player = objects.create_object("/mob/player").unwrap();
        let mob = objects.create_object("/mob").unwrap();
        assert_eq!(objects.resolve_proc(player, "attack"), Some(ProcId(2)));
        assert_eq!(objects.resolve_proc(player, "heal"), Some(ProcId(3)));
        assert_eq!(objects.resolve_proc(mob, "attack"), Some(ProcId(1)));
        assert_eq!(objects.resolve_proc(mob, "fly"), None);
    }

    #[test]
    fn test_unknown_type() {
        let mut objects = world();
        assert!(objects.create_object("/turf").is_err());
    }

    #[test]
    fn test_subtype() {
        let objects = world();
        assert!(objects.is_subtype("/mob/player", "/mob"));
        assert!(objects.is_subtype("/mob", "/mob"));
        assert!(!objects.is_subtype("/mobile", "/mob"));
    }

    #[test]
    fn test_delete_leaves_hole() {
        let mut objects = world();
        let a = objects.create_object("/mob").unwrap();
        let b = objects.create_object("/mob").unwrap();
        objects.delete_object(a);
        assert!(!objects.is_live(a));
        assert_eq!(objects.instance_at(0), Some(None));
        assert_eq!(objects.instance_at(1), Some(Some(b)));
        assert_eq!(objects.instance_at(2), None);
    }

    #[test]
    fn test_list_one_based() {
        let mut objects = world();
        let list = objects.create_list(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(objects.list_get(list, &Value::Integer(1)).unwrap(), Value::Integer(1));
        assert!(objects.list_get(list, &Value::Integer(0)).is_err());
        assert!(objects.list_get(list, &Value::Integer(3)).is_err());
        objects.list_set(list, &Value::Integer(2), Value::Integer(7)).unwrap();
        objects.list_append(list, Value::Integer(1)).unwrap();
        objects.list_remove(list, &Value::Integer(1)).unwrap();
        assert_eq!(
            objects.list_snapshot(list).unwrap(),
            vec![Value::Integer(1), Value::Integer(7)]
        );
    }

    #[test]
    fn test_display_name() {
        let mut objects = world();
        let player = objects.create_object("/mob/player").unwrap();
        let mob = objects.create_object("/mob").unwrap();
        assert_eq!(objects.display_name(player), "hero");
        assert_eq!(objects.display_name(mob), "mob");
    }
}
