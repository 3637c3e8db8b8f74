// =============================================================================
// OPCODE - one byte per instruction, followed by its operands
// =============================================================================
//
// Stack effects are written as `( before -- after )`. `&x` is a reference
// handle to the storage location `x`, `args` an argument bundle and `target`
// a call target.

/// Operand layout following an opcode byte. All multi-byte fields are
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// 4-byte signed integer.
    Int,
    /// 4-byte float.
    Float,
    /// 4-byte index into the string table.
    Str,
    /// 1-byte local slot index.
    Slot,
    /// 4-byte absolute byte offset into the same proc's stream.
    Jump,
    /// Argument descriptor list: 4-byte count, then per argument a kind byte
    /// (`ARG_POSITIONAL` or `ARG_NAMED`) and, for named arguments, a string id.
    ArgList,
}

impl Operand {
    /// Encoded size, or `None` when the operand is variable-length.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Operand::Int | Operand::Float | Operand::Str | Operand::Jump => Some(4),
            Operand::Slot => Some(1),
            Operand::ArgList => None,
        }
    }
}

pub const ARG_POSITIONAL: u8 = 0;
pub const ARG_NAMED: u8 = 1;

/// Marker in a `FormatString` template. The byte after it selects how the
/// next popped value is substituted.
pub const FORMAT_MARKER: char = '\u{FF}';
/// Substitute the value's display text.
pub const FORMAT_STRINGIFY: char = 's';
/// Substitute the value's reference id.
pub const FORMAT_REF: char = 'r';

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $byte:literal, $mnemonic:literal, [$($operand:ident),*]; )*) => {
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $byte, )*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name),*];

            pub fn from_byte(byte: u8) -> Option<Opcode> {
                match byte {
                    $( $byte => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            pub fn operands(self) -> &'static [Operand] {
                match self {
                    $( Opcode::$name => &[$(Operand::$operand),*], )*
                }
            }
        }
    };
}

opcodes! {
    // ─── Values ───

    /// ( -- null )
    PushNull = 0x01, "PUSH_NULL", [];
    /// ( -- n )
    PushInt = 0x02, "PUSH_INT", [Int];
    /// ( -- n )
    PushFloat = 0x03, "PUSH_FLOAT", [Float];
    /// ( -- s )
    PushString = 0x04, "PUSH_STRING", [Str];
    /// ( -- path )
    PushPath = 0x05, "PUSH_PATH", [Str];
    /// ( -- resource )
    PushResource = 0x06, "PUSH_RESOURCE", [Str];
    /// ( -- src )
    PushSrc = 0x07, "PUSH_SRC", [];
    /// ( -- usr )
    PushUsr = 0x08, "PUSH_USR", [];
    /// ( -- . )
    PushResult = 0x09, "PUSH_RESULT", [];
    /// ( -- &. )
    PushResultRef = 0x0A, "PUSH_RESULT_REF", [];
    /// ( -- local )
    PushLocal = 0x0B, "PUSH_LOCAL", [Slot];
    /// ( -- &local )
    PushLocalRef = 0x0C, "PUSH_LOCAL_REF", [Slot];
    /// ( v -- )
    SetLocal = 0x0D, "SET_LOCAL", [Slot];
    /// ( -- global )
    PushGlobal = 0x0E, "PUSH_GLOBAL", [Int];
    /// ( -- &global )
    PushGlobalRef = 0x0F, "PUSH_GLOBAL_REF", [Int];
    /// ( obj -- obj.field )
    GetField = 0x10, "GET_FIELD", [Str];
    /// ( obj -- &obj.field )
    FieldRef = 0x11, "FIELD_REF", [Str];
    /// ( -- &src.field )
    SrcFieldRef = 0x12, "SRC_FIELD_REF", [Str];
    /// ( &x v -- v )
    Assign = 0x13, "ASSIGN", [];
    /// ( v1 .. vn -- s ) template string id, value count
    FormatString = 0x14, "FORMAT_STRING", [Str, Int];
    /// ( v -- )
    Pop = 0x15, "POP", [];

    // ─── Arithmetic ───

    /// ( a b -- a+b )
    Add = 0x20, "ADD", [];
    /// ( a b -- a-b )
    Subtract = 0x21, "SUB", [];
    /// ( a b -- a*b )
    Multiply = 0x22, "MUL", [];
    /// ( a b -- a/b )
    Divide = 0x23, "DIV", [];
    /// ( a b -- a%b )
    Modulus = 0x24, "MOD", [];
    /// ( a b -- a**b )
    Power = 0x25, "POW", [];
    /// ( a -- -a )
    Negate = 0x26, "NEG", [];
    /// ( a b -- a&b )
    BitAnd = 0x27, "BIT_AND", [];
    /// ( a b -- a|b )
    BitOr = 0x28, "BIT_OR", [];
    /// ( a b -- a^b )
    BitXor = 0x29, "BIT_XOR", [];
    /// ( a -- ~a )
    BitNot = 0x2A, "BIT_NOT", [];
    /// ( a b -- a<<b )
    ShiftLeft = 0x2B, "SHL", [];
    /// ( a b -- a>>b )
    ShiftRight = 0x2C, "SHR", [];
    /// ( a -- !a )
    BooleanNot = 0x2D, "NOT", [];
    /// ( a -- ) continue with the right-hand side, or ( a -- a ) and jump when `a` is false
    BooleanAnd = 0x2E, "AND", [Jump];
    /// ( a -- ) continue with the right-hand side, or ( a -- a ) and jump when `a` is true
    BooleanOr = 0x2F, "OR", [Jump];

    // ─── Compound assignment ───

    /// ( &x v -- x' ) `x += v`
    Append = 0x30, "APPEND", [];
    /// ( &x v -- x' ) `x -= v`
    Remove = 0x31, "REMOVE", [];
    /// ( &x v -- x' ) `x |= v`
    Combine = 0x32, "COMBINE", [];
    /// ( &x v -- x' ) `x &= v`
    Mask = 0x33, "MASK", [];

    // ─── Comparison ───

    /// ( a b -- a==b )
    CompareEquals = 0x38, "EQ", [];
    /// ( a b -- a!=b )
    CompareNotEquals = 0x39, "NE", [];
    /// ( a b -- a<b )
    CompareLessThan = 0x3A, "LT", [];
    /// ( a b -- a>b )
    CompareGreaterThan = 0x3B, "GT", [];
    /// ( a b -- a<=b )
    CompareLessThanOrEqual = 0x3C, "LE", [];
    /// ( a b -- a>=b )
    CompareGreaterThanOrEqual = 0x3D, "GE", [];
    /// ( v path -- istype(v, path) )
    IsType = 0x3E, "ISTYPE", [];
    /// ( v -- isnull(v) )
    IsNull = 0x3F, "ISNULL", [];
    /// ( v list -- v in list )
    IsInList = 0x40, "IN", [];

    // ─── Control flow ───

    /// ( -- )
    Jump = 0x48, "JUMP", [Jump];
    /// ( cond -- )
    JumpIfFalse = 0x49, "JUMP_FALSE", [Jump];
    /// ( cond -- )
    JumpIfTrue = 0x4A, "JUMP_TRUE", [Jump];
    /// ( v case -- ) on match, ( v case -- v ) otherwise
    SwitchCase = 0x4B, "SWITCH_CASE", [Jump];
    /// ( v lo hi -- ) on match, ( v lo hi -- v ) otherwise
    SwitchCaseRange = 0x4C, "SWITCH_RANGE", [Jump];
    /// ( v -- )
    Return = 0x4D, "RETURN", [];
    /// ( -- ) raises a catchable error
    Error = 0x4E, "ERROR", [];
    /// ( -- ) open a catch region: catch pc, exception slot
    Try = 0x4F, "TRY", [Jump, Slot];
    /// ( -- ) open a catch region that discards the exception
    TryNoValue = 0x50, "TRY_NO_VALUE", [Jump];
    /// ( -- ) close the innermost catch region
    EndTry = 0x51, "END_TRY", [];
    /// ( v -- )
    Throw = 0x52, "THROW", [];
    /// ( delay -- )
    Sleep = 0x53, "SLEEP", [];
    /// ( delay -- ) the copy continues after the instruction, this state at the jump
    Spawn = 0x54, "SPAWN", [Jump];

    // ─── Collections ───

    /// ( v1 .. vn -- list )
    CreateList = 0x58, "CREATE_LIST", [Int];
    /// ( list -- )
    CreateListEnumerator = 0x59, "ENUM_LIST", [];
    /// ( start end step -- )
    CreateRangeEnumerator = 0x5A, "ENUM_RANGE", [];
    /// ( -- ) iterate live instances of a type path, or all objects for the empty string
    CreateTypeEnumerator = 0x5B, "ENUM_TYPE", [Str];
    /// ( -- ) store the next item into the slot, or jump when exhausted
    Enumerate = 0x5C, "ENUMERATE", [Slot, Jump];
    /// ( -- )
    DestroyEnumerator = 0x5D, "ENUM_END", [];
    /// ( list index -- list[index] )
    IndexList = 0x5E, "INDEX", [];
    /// ( list index -- &list[index] )
    IndexListRef = 0x5F, "INDEX_REF", [];
    /// ( path args -- obj )
    CreateObject = 0x60, "NEW", [];
    /// ( obj -- )
    DeleteObject = 0x61, "DEL", [];

    // ─── Calls ───

    /// ( v1 .. vn -- args )
    PushArguments = 0x68, "PUSH_ARGS", [ArgList];
    /// ( list -- args ) positional values from a list
    PushArgumentList = 0x69, "PUSH_ARG_LIST", [];
    /// ( target args -- result )
    Call = 0x6A, "CALL", [];
    /// ( args -- result ) call the running proc again on the same src
    CallSelf = 0x6B, "CALL_SELF", [];
    /// ( obj name args -- result ) the proc is looked up by a runtime string or path
    CallStatement = 0x6C, "CALL_DYNAMIC", [];
    /// ( obj -- target ) proc looked up by name on the object
    DereferenceProc = 0x6D, "DEREF_PROC", [Str];
    /// ( -- target ) global proc looked up by name
    GetProc = 0x6E, "GET_PROC", [Str];
    /// ( -- target ) the running proc's parent definition on the same src
    PushSuperProc = 0x6F, "PUSH_SUPER", [];

    // ─── Host I/O ───

    /// ( receiver body options -- )
    Browse = 0x70, "BROWSE", [];
    /// ( receiver resource filename -- )
    BrowseResource = 0x71, "BROWSE_RSC", [];
    /// ( receiver message control -- )
    OutputControl = 0x72, "OUTPUT", [];
    /// ( receiver message title default -- reply ) input type flags
    Prompt = 0x73, "PROMPT", [Int];
    /// ( path container -- obj )
    Locate = 0x74, "LOCATE", [];
    /// ( x y z -- obj )
    LocateCoord = 0x75, "LOCATE_XYZ", [];
}
