use std::rc::Rc;

use crate::lang::objects::ObjectModel;
use crate::lang::value::Value;
use crate::runtime::runtime_error::{RuntimeError, type_error};

/// Iterator behind a `for` loop, owned by the frame running the loop.
#[derive(Debug, Clone)]
pub enum Enumerator {
    /// Walks a copy of the list taken when the loop started.
    List { items: Vec<Value>, next: usize },

    /// `start to end step step`. The `n`th item is `start + n * step`, so
    /// fractional steps do not accumulate error.
    Range {
        start: f64,
        end: f64,
        step: f64,
        n: u64,
        integral: bool,
    },

    /// Live instances of a type (every object when `filter` is `None`),
    /// scanned lazily so objects created during the loop can still show up.
    Type {
        filter: Option<Rc<str>>,
        cursor: usize,
    },
}

impl Enumerator {
    pub fn list(items: Vec<Value>) -> Self {
        Enumerator::List { items, next: 0 }
    }

    pub fn range(start: &Value, end: &Value, step: &Value) -> Result<Self, RuntimeError> {
        let number = |v: &Value| {
            v.as_number().ok_or_else(|| {
                type_error(format!("range bounds must be numbers, got {}", v.type_name()))
            })
        };
        let (s, e, st) = (number(start)?, number(end)?, number(step)?);
        if st == 0.0 {
            return Err(type_error("range step cannot be zero"));
        }

        Ok(Enumerator::Range {
            start: s as f64,
            end: e as f64,
            step: st as f64,
            n: 0,
            integral: matches!((start, step), (Value::Integer(_), Value::Integer(_))),
        })
    }

    pub fn of_type(filter: Option<&str>) -> Self {
        Enumerator::Type {
            filter: filter.map(Rc::from),
            cursor: 0,
        }
    }

    /// The next item, or `None` once exhausted.
    pub fn try_advance(&mut self, objects: &dyn ObjectModel) -> Option<Value> {
        match self {
            Enumerator::List { items, next } => {
                let item = items.get(*next)?.clone();
                *next += 1;
                Some(item)
            }

            Enumerator::Range {
                start,
                end,
                step,
                n,
                integral,
            } => {
                let current = *start + (*n as f64) * *step;
                let in_range = if *step > 0.0 {
                    current <= *end
                } else {
                    current >= *end
                };
                if !in_range {
                    return None;
                }
                *n = n.checked_add(1)?;
                if *integral {
                    Some(Value::Integer(current as i32))
                } else {
                    Some(Value::Float(current as f32))
                }
            }

            Enumerator::Type { filter, cursor } => loop {
                let slot = objects.instance_at(*cursor)?;
                *cursor += 1;
                let Some(obj) = slot else { continue };
                let matches = match filter {
                    None => true,
                    Some(path) => objects
                        .type_of(obj)
                        .is_some_and(|ty| objects.is_subtype(&ty, path)),
                };
                if matches {
                    return Some(Value::Object(obj));
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::objects::MemoryObjects;

    fn drain(mut e: Enumerator, objects: &MemoryObjects) -> Vec<Value> {
        std::iter::from_fn(|| e.try_advance(objects)).collect()
    }

    fn ints(values: &[i32]) -> Vec<Value> {
        values.iter().map(|n| Value::Integer(*n)).collect()
    }

    fn range(start: i32, end: i32, step: i32) -> Enumerator {
        Enumerator::range(
            &Value::Integer(start),
            &Value::Integer(end),
            &Value::Integer(step),
        )
        .unwrap()
    }

    #[test]
    fn test_range_ascending() {
        let objects = MemoryObjects::new();
        assert_eq!(drain(range(1, 5, 1), &objects), ints(&[1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_range_descending() {
        let objects = MemoryObjects::new();
        assert_eq!(drain(range(5, 1, -1), &objects), ints(&[5, 4, 3, 2, 1]));
    }

    #[test]
    fn test_range_with_step() {
        let objects = MemoryObjects::new();
        assert_eq!(drain(range(1, 5, 2), &objects), ints(&[1, 3, 5]));
    }

    #[test]
    fn test_range_counter_overflow_ends_loop() {
        let mut e = Enumerator::Range {
            start: 0.0,
            end: f64::INFINITY,
            step: 1.0,
            n: u64::MAX,
            integral: false,
        };
        assert_eq!(e.try_advance(&MemoryObjects::new()), None);
    }

    #[test]
    fn test_range_fractional_step() {
        let objects = MemoryObjects::new();
        let e = Enumerator::range(&Value::Integer(0), &Value::Integer(1), &Value::Float(0.25))
            .unwrap();
        let values = drain(e, &objects);
        assert_eq!(values.len(), 5);
        assert_eq!(values[4], Value::Float(1.0));
    }

    #[test]
    fn test_range_empty_and_zero_step() {
        let objects = MemoryObjects::new();
        assert!(drain(range(5, 1, 1), &objects).is_empty());
        assert!(
            Enumerator::range(&Value::Integer(1), &Value::Integer(2), &Value::Integer(0)).is_err()
        );
    }

    #[test]
    fn test_list_snapshot_unaffected_by_source_mutation() {
        let mut objects = MemoryObjects::new();
        let list = objects.create_list(ints(&[1, 2, 3]));
        let mut e = Enumerator::list(objects.list_snapshot(list).unwrap());

        assert_eq!(e.try_advance(&objects), Some(Value::Integer(1)));
        objects.list_append(list, Value::Integer(4)).unwrap();
        objects.list_remove(list, &Value::Integer(2)).unwrap();

        let rest = drain(e, &objects);
        assert_eq!(rest, ints(&[2, 3]));
    }

    #[test]
    fn test_type_filter_skips_lazily() {
        let mut objects = MemoryObjects::new();
        objects.define_field("/mob", "hp", Value::Null);
        objects.define_field("/obj", "weight", Value::Null);
        let a = objects.create_object("/mob").unwrap();
        let _b = objects.create_object("/obj").unwrap();
        let c = objects.create_object("/mob").unwrap();

        let mut e = Enumerator::of_type(Some("/mob"));
        assert_eq!(e.try_advance(&objects), Some(Value::Object(a)));
        objects.delete_object(c);
        let d = objects.create_object("/mob").unwrap();
        assert_eq!(e.try_advance(&objects), Some(Value::Object(d)));
        assert_eq!(e.try_advance(&objects), None);
    }
}
