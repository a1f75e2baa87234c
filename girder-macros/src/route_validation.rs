//! Compile-time path validation
//!
//! Controller and route paths are checked while the macro expands:
//! - No double slashes or trailing slash (except `/`)
//! - Parameters use `:name` or `{name}` and are valid identifiers
//! - No duplicate parameter names
//! - Static segments use URL-safe characters only
//!
//! A leading slash is optional; paths are joined with single slashes when
//! the route table is built.

use proc_macro2::Span;
use syn::Error;

/// Validate a controller path. Controller paths are plain prefixes: no
/// parameters, no wildcards.
pub fn validate_controller_path(path: &str, span: Span) -> Result<(), Error> {
    check_slashes("controller", path, span)?;

    if path.contains(':') || path.contains('{') {
        return Err(Error::new(
            span,
            format!(
                "controller path should not contain path parameters: \"{path}\"\n\
                 hint: path parameters belong in individual route definitions"
            ),
        ));
    }

    if path.contains('*') {
        return Err(Error::new(
            span,
            format!("controller path should not contain wildcards: \"{path}\""),
        ));
    }

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        validate_segment(segment, span)?;
    }

    Ok(())
}

/// Validate a route path; returns its parameter names in order.
pub fn validate_route_path(path: &str, span: Span) -> Result<Vec<String>, Error> {
    check_slashes("route", path, span)?;

    let mut params: Vec<String> = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment.starts_with('*') || segment.starts_with("{*") {
            return Err(Error::new(
                span,
                format!(
                    "wildcard segments are not supported: \"{path}\"\n\
                     hint: use a named parameter such as ':rest'"
                ),
            ));
        }

        match parse_parameter(segment) {
            Some(name) => {
                validate_identifier(name, span)?;
                if params.iter().any(|p| p == name) {
                    return Err(Error::new(
                        span,
                        format!(
                            "duplicate path parameter '{name}' in route: \"{path}\"\n\
                             hint: each parameter name must be unique"
                        ),
                    ));
                }
                params.push(name.to_string());
            }
            None => validate_segment(segment, span)?,
        }
    }

    Ok(params)
}

fn check_slashes(kind: &str, path: &str, span: Span) -> Result<(), Error> {
    if path.contains("//") {
        return Err(Error::new(
            span,
            format!("{kind} path contains double slashes: \"{path}\"\nhint: remove consecutive slashes"),
        ));
    }

    if path.len() > 1 && path.ends_with('/') {
        return Err(Error::new(
            span,
            format!("{kind} path should not have trailing slash: \"{path}\"\nhint: remove the trailing slash"),
        ));
    }

    Ok(())
}

/// `:id` or `{id}`
fn parse_parameter(segment: &str) -> Option<&str> {
    if let Some(name) = segment.strip_prefix(':') {
        return Some(name);
    }
    segment.strip_prefix('{').and_then(|s| s.strip_suffix('}'))
}

fn validate_identifier(name: &str, span: Span) -> Result<(), Error> {
    let Some(first) = name.chars().next() else {
        return Err(Error::new(span, "parameter name cannot be empty"));
    };

    if !first.is_alphabetic() && first != '_' {
        return Err(Error::new(
            span,
            format!(
                "parameter name '{name}' must start with a letter or underscore\n\
                 hint: valid names start with a-z, A-Z, or _"
            ),
        ));
    }

    if let Some(c) = name.chars().find(|c| !c.is_alphanumeric() && *c != '_') {
        return Err(Error::new(
            span,
            format!(
                "parameter name '{name}' contains invalid character '{c}'\n\
                 hint: use only letters, numbers, and underscores"
            ),
        ));
    }

    Ok(())
}

fn validate_segment(segment: &str, span: Span) -> Result<(), Error> {
    if let Some(c) = segment
        .chars()
        .find(|c| !c.is_alphanumeric() && !matches!(c, '-' | '_' | '.' | '~'))
    {
        return Err(Error::new(
            span,
            format!(
                "route segment '{segment}' contains invalid character '{c}'\n\
                 hint: use only letters, numbers, hyphens, underscores, dots, or tildes\n\
                 hint: for a path parameter, use ':{segment}' or '{{{segment}}}' syntax"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(path: &str) -> Result<Vec<String>, String> {
        validate_route_path(path, Span::call_site()).map_err(|e| e.to_string())
    }

    fn controller(path: &str) -> Result<(), String> {
        validate_controller_path(path, Span::call_site()).map_err(|e| e.to_string())
    }

    #[test]
    fn test_valid_routes() {
        assert_eq!(route("").unwrap(), Vec::<String>::new());
        assert!(route("/").is_ok());
        assert!(route("/messages").is_ok());
        assert!(route("messages").is_ok());
        assert_eq!(route("/users/:user_id/posts/{post_id}").unwrap(), vec!["user_id", "post_id"]);
    }

    #[test]
    fn test_invalid_routes() {
        assert!(route("/users/").is_err());
        assert!(route("/users//posts").is_err());
        assert!(route("/users/:").is_err());
        assert!(route("/users/:123").is_err());
        assert!(route("/users/:id/:id").is_err());
        assert!(route("/files/*path").is_err());
        assert!(route("/hello world").is_err());
    }

    #[test]
    fn test_controller_paths() {
        assert!(controller("").is_ok());
        assert!(controller("/messages").is_ok());
        assert!(controller("admin/users").is_ok());
        assert!(controller("/users/:id").is_err());
        assert!(controller("/messages/").is_err());
        assert!(controller("/static/*").is_err());
    }
}
