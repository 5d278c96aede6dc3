//! WGSL sources and the checks that tie them to the uniform registry.

use crate::error::SetupError;
use crate::registry::UniformRegistry;
use std::collections::BTreeSet;
use std::path::Path;

/// `struct Uniforms` plus its binding; prepended to every program body.
pub const UNIFORMS_WGSL: &str = include_str!("../shaders/uniforms.wgsl");
pub const SPIRIT_POINTS_WGSL: &str = include_str!("../shaders/spirit_points.wgsl");
pub const RETICLE_WGSL: &str = include_str!("../shaders/reticle.wgsl");

/// Full module source for a program body.
pub fn compose(body: &str) -> String {
    format!("{UNIFORMS_WGSL}\n{body}")
}

/// `(member, type)` pairs of `struct <name> { ... }` in declaration order.
pub fn struct_fields(src: &str, name: &str) -> Vec<(String, String)> {
    let header = format!("struct {name}");
    let Some(start) = src.find(&header) else {
        return Vec::new();
    };
    let rest = &src[start + header.len()..];
    let (Some(open), Some(close)) = (rest.find('{'), rest.find('}')) else {
        return Vec::new();
    };

    rest[open + 1..close]
        .lines()
        .map(|line| line.split("//").next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .flat_map(|line| line.split(','))
        .filter_map(|member| {
            let (field, ty) = member.split_once(':')?;
            Some((field.trim().to_string(), ty.trim().to_string()))
        })
        .collect()
}

/// Every `U.<member>` the source reads.
pub fn uniform_references(src: &str) -> BTreeSet<String> {
    let bytes = src.as_bytes();
    let mut names = BTreeSet::new();
    let mut from = 0;

    while let Some(pos) = src[from..].find("U.") {
        let at = from + pos;
        from = at + 2;

        // `U` must be a whole identifier, not the tail of e.g. `OUT.`.
        let standalone = at == 0 || !is_ident_byte(bytes[at - 1]);
        if !standalone {
            continue;
        }

        let ident: String = src[at + 2..]
            .bytes()
            .take_while(|&b| is_ident_byte(b))
            .map(char::from)
            .collect();
        if !ident.is_empty() {
            names.insert(ident);
        }
    }
    names
}

/// Names of the `var <name>: texture_*` bindings, in source order.
pub fn texture_bindings(src: &str) -> Vec<String> {
    src.lines()
        .filter_map(|line| {
            let (_, decl) = line.split_once("var ")?;
            let (name, ty) = decl.split_once(':')?;
            ty.trim_start()
                .starts_with("texture_")
                .then(|| name.trim().to_string())
        })
        .collect()
}

#[inline]
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Rejects a program body that reads a uniform the registry does not declare.
pub fn check_references(registry: &UniformRegistry, label: &str, body: &str) -> Result<(), SetupError> {
    let declared: BTreeSet<&str> = registry.names().collect();
    let missing: Vec<String> = uniform_references(body)
        .into_iter()
        .filter(|name| !declared.contains(name.as_str()))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SetupError::ShaderCompile {
            label: label.to_string(),
            message: format!("reads undeclared uniforms: {}", missing.join(", ")),
        })
    }
}

/// Point program body: the embedded default, or a replacement read from disk.
pub fn load_point_program(path: Option<&Path>) -> Result<String, SetupError> {
    match path {
        None => Ok(SPIRIT_POINTS_WGSL.to_string()),
        Some(path) => {
            log::info!("Reading point shader from {}", path.display());
            std::fs::read_to_string(path).map_err(|source| SetupError::ShaderRead {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}
