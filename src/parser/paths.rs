//! Relative template names (`./x.html`, `../x.html`)

/// Resolve `name` against the template it appears in
///
/// Names not starting with `./` or `../` are returned unchanged, as are all
/// names inside templates that have no name of their own.
pub(crate) fn resolve_relative(origin: Option<&str>, name: &str) -> Result<String, String> {
    let Some(origin) = origin else {
        return Ok(name.to_string());
    };
    if !(name.starts_with("./") || name.starts_with("../")) {
        return Ok(name.to_string());
    }

    let origin = origin.trim_start_matches('/');
    let dir = match origin.rfind('/') {
        Some(idx) => &origin[..idx],
        None => "",
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in dir.split('/').chain(name.split('/')) {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    if parts.first() == Some(&"..") {
        return Err(format!(
            "The relative path '{}' points outside the file hierarchy that template '{}' is in",
            name, origin
        ));
    }
    let resolved = parts.join("/");
    if resolved == origin {
        return Err(format!(
            "The relative path '{}' was translated to template name '{}', the same template in which the tag appears",
            name, resolved
        ));
    }
    Ok(resolved)
}
