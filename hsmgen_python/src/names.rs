//! Python naming rules for generated classes, fields and action stubs.

/// Python keywords, which cannot be used as identifiers.
pub const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
];

/// Module-level names defined or imported by the generated runtime.
pub const SUPPORT_NAMES: &[&str] = &[
    "State",
    "SimpleState",
    "CompositeState",
    "CompositeStateWithHistory",
    "StateMachine",
    "ABC",
    "abstractmethod",
    "SimpleNamespace",
];

/// Builtins a guard may call; they are not read from the context.
pub const BUILTINS: &[&str] = &[
    "abs",
    "all",
    "any",
    "bool",
    "float",
    "int",
    "isinstance",
    "len",
    "max",
    "min",
    "round",
    "str",
    "sum",
];

/// Names bound inside the generated methods, where action calls are emitted.
pub const LOCAL_NAMES: &[&str] = &["self", "super", "use_history"];

// Attributes and methods of the runtime's base classes and of `StateMachine`
const ATTRIBUTES: &[&str] = &[
    "state",
    "parent",
    "machine",
    "context",
    "entry",
    "exit",
    "dispatch",
    "transition",
    "history",
    "_state",
    "_history",
];

/// Whether the name is a Python identifier (keywords included).
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first == '_' || first.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Whether the name is a Python keyword.
pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Class name of a state: the state name with its first character upper-cased.
pub fn class_name(state: &str) -> String {
    let mut chars = state.chars();
    let mut class: String = chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default();
    if is_keyword(&class) || SUPPORT_NAMES.contains(&class.as_str()) {
        class.push('_');
    }
    class
}

/// Field name of a state in its parent: the lower-cased state name.
pub fn field_name(state: &str) -> String {
    let mut field = state.to_lowercase();
    if is_keyword(&field) || ATTRIBUTES.contains(&field.as_str()) {
        field.push('_');
    }
    field
}

/// Python string literal with the given content.
pub fn string_literal(content: &str) -> String {
    let mut literal = String::with_capacity(content.len() + 2);
    literal.push('"');
    for c in content.chars() {
        match c {
            '"' => literal.push_str("\\\""),
            '\\' => literal.push_str("\\\\"),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            '\t' => literal.push_str("\\t"),
            c if c.is_control() => literal.push_str(&format!("\\x{:02x}", c as u32)),
            c => literal.push(c),
        }
    }
    literal.push('"');
    literal
}
