//! Naming-pattern expansion: combines a term with common class and method
//! naming conventions, plus camelCase/snake_case conversions.

const CLASS_SUFFIXES: &[&str] = &[
    "Service",
    "Manager",
    "Controller",
    "Handler",
    "Processor",
    "Impl",
    "Factory",
    "Provider",
    "Repository",
    "Builder",
    "Engine",
    "Helper",
];

const CLASS_PREFIXES: &[&str] = &["Abstract", "Base", "Default", "Simple"];

const METHOD_PREFIXES: &[&str] = &[
    "get", "set", "is", "has", "create", "build", "process", "handle", "execute", "find", "load",
    "save", "update", "delete", "validate",
];

const FIELD_SUFFIXES: &[&str] = &["Id", "Name", "Count", "List", "Config"];

/// Expand one term into naming-convention variants, capped at `max_output`.
/// Deterministic: variant order follows the fixed tables above.
pub fn expand(term: &str, max_output: usize) -> Vec<String> {
    let term = term.trim();
    if term.is_empty() || max_output == 0 {
        return Vec::new();
    }
    let capitalized = capitalize(term);
    let mut out: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if candidate != term && !out.contains(&candidate) {
            out.push(candidate);
        }
    };

    for suffix in CLASS_SUFFIXES {
        push(format!("{capitalized}{suffix}"));
    }
    for prefix in CLASS_PREFIXES {
        push(format!("{prefix}{capitalized}"));
    }
    for prefix in METHOD_PREFIXES {
        push(format!("{prefix}{capitalized}"));
    }
    for suffix in FIELD_SUFFIXES {
        push(format!("{}{suffix}", decapitalize(term)));
    }

    let snake = camel_to_snake(term);
    if snake != term {
        push(snake);
    }
    let camel = snake_to_camel(term);
    if camel != term {
        push(camel);
    }

    out.truncate(max_output);
    out
}

pub fn capitalize(term: &str) -> String {
    let mut chars = term.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

pub fn decapitalize(term: &str) -> String {
    let mut chars = term.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

pub fn camel_to_snake(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 4);
    for (i, c) in term.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

pub fn snake_to_camel(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    let mut upper_next = false;
    for c in term.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Split an identifier into lowercase pieces on camelCase humps, underscores,
/// dots, and hyphens. Shared by the quality filter and semantic coherence.
pub fn split_identifier(term: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut prev_upper = false;
    for c in term.chars() {
        if c == '_' || c == '.' || c == '-' || c == ' ' {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            prev_upper = false;
        } else if c.is_uppercase() {
            // Start a new piece on a case hump; consecutive uppercase stays
            // together so acronyms survive as one piece.
            if !current.is_empty() && !prev_upper {
                pieces.push(std::mem::take(&mut current));
            }
            current.extend(c.to_lowercase());
            prev_upper = true;
        } else {
            current.push(c);
            prev_upper = false;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
