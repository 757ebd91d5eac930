#![forbid(unsafe_code)]

//! Source names to Rust names.

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "box", "break", "const", "continue", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "gen", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut",
    "priv", "pub", "ref", "return", "static", "struct", "trait", "true", "try", "type", "typeof",
    "unsafe", "unsized", "use", "virtual", "where", "while", "yield", "abstract", "become", "do",
    "final", "macro", "override",
];

/// Keywords that cannot be raw identifiers.
const RESERVED: &[&str] = &["self", "Self", "super", "crate"];

/// `parseHTTPRequest` -> `parse_http_request`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|j| chars[j]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `point` -> `Point`, `line_item` -> `LineItem`; already-Pascal names are kept.
pub fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut cs = part.chars();
            match cs.next() {
                Some(first) => first.to_uppercase().chain(cs).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

pub fn escape(name: &str) -> String {
    if RESERVED.contains(&name) {
        format!("{name}_")
    } else if KEYWORDS.contains(&name) {
        format!("r#{name}")
    } else {
        name.to_string()
    }
}

/// Variables, parameters, functions, methods and fields.
pub fn value_name(name: &str) -> String {
    if name == "this" {
        return "self".to_string();
    }
    escape(&snake_case(name))
}

/// Aggregates, enums, aliases and variants.
pub fn type_name(name: &str) -> String {
    escape(&pascal_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_to_snake() {
        assert_eq!(snake_case("totalCount"), "total_count");
        assert_eq!(snake_case("parseHTTPRequest"), "parse_http_request");
        assert_eq!(snake_case("x2Offset"), "x2_offset");
        assert_eq!(snake_case("already_snake"), "already_snake");
        assert_eq!(snake_case("MAX_SIZE"), "max_size");
    }

    #[test]
    fn pascal() {
        assert_eq!(pascal_case("point"), "Point");
        assert_eq!(pascal_case("line_item"), "LineItem");
        assert_eq!(pascal_case("HTTPServer"), "HTTPServer");
    }

    #[test]
    fn keywords_and_receiver() {
        assert_eq!(value_name("type"), "r#type");
        assert_eq!(value_name("match"), "r#match");
        assert_eq!(value_name("this"), "self");
        assert_eq!(value_name("self"), "self_");
        assert_eq!(type_name("Self"), "Self_");
        assert_eq!(value_name("count"), "count");
    }
}
