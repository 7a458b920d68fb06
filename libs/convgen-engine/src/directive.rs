//! Directive syntax.
//!
//! Package scope:
//!
//! - `+gen:convert: pkgA, pkgB` maps the listed packages onto themselves.
//! - `+gen:convert: pkgA -> pkgB` declares destination types on the left
//!   and source types on the right.
//!
//! Per type: `+convert:type=Name`, `+convert:create=pkg.Name`,
//! `+convert:update=Name(ID,Owner)`.

use std::sync::LazyLock;

use regex::Regex;

use convgen_api::model::{Directive, TypeIdentity};
use convgen_api::plan::Mode;

use crate::error::GenError;

/// Package-scope directive command.
pub const COMMAND: &str = "gen:convert";

const SCOPE_FORMAT: &str = "must in format pkg1 -> pkg2";

static TYPE_NAME: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(.+\.)?([^.(]+)(\([^)]*\))?$"));

/// Packages named by one `gen:convert` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertScope {
    /// Packages declaring the named (source) types.
    pub sources: Vec<String>,
    /// Packages declaring the types that carry per-type directives.
    pub targets: Vec<String>,
}

pub fn parse_convert_directive(arg: &str) -> Result<ConvertScope, GenError> {
    if !arg.contains("->") {
        let packages = split_packages(arg)?;
        return Ok(ConvertScope {
            sources: packages.clone(),
            targets: packages,
        });
    }

    let parts: Vec<&str> = arg.split("->").collect();
    let [targets, sources] = parts.as_slice() else {
        return Err(GenError::InvalidDirective(format!("{arg} ({SCOPE_FORMAT})")));
    };
    Ok(ConvertScope {
        sources: split_packages(sources)?,
        targets: split_packages(targets)?,
    })
}

fn split_packages(list: &str) -> Result<Vec<String>, GenError> {
    list.split(',')
        .map(|p| {
            let p = p.trim();
            if p.is_empty() {
                Err(GenError::InvalidDirective(format!("{list} ({SCOPE_FORMAT})")))
            } else {
                Ok(p.to_string())
            }
        })
        .collect()
}

/// Whether both lists name the same set of packages.
///
/// A package listed twice is an error.
pub fn validate_equality(left: &[String], right: &[String]) -> Result<bool, GenError> {
    if left.len() != right.len() {
        return Ok(false);
    }
    let mut count = 0;
    let mut seen = vec![false; left.len()];
    for (i, l) in left.iter().enumerate() {
        for r in right {
            if l == r {
                if seen[i] {
                    return Err(GenError::InvalidDirective(format!("duplicated package ({l})")));
                }
                seen[i] = true;
                count += 1;
            }
        }
    }
    Ok(count == left.len())
}

/// Whether `tail` names `path` by whole trailing segments.
pub fn has_base(path: &str, tail: &str) -> bool {
    path == tail
        || (path.len() > tail.len()
            && path.ends_with(tail)
            && path.as_bytes()[path.len() - tail.len() - 1] == b'/')
}

/// A type named by a per-type directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTarget {
    pub name: TypeIdentity,
    /// Update-mode identifier fields.
    pub identifiers: Vec<String>,
}

fn is_exported_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Resolve `Name`, `pkg.Name` or `Name(id1,id2)` against the source packages.
pub fn parse_type_name(sources: &[String], input: &str) -> Result<TypeTarget, GenError> {
    let re = TYPE_NAME
        .as_ref()
        .map_err(|e| GenError::InvalidDirective(e.to_string()))?;
    let caps = re
        .captures(input)
        .ok_or_else(|| GenError::InvalidDirective(format!("invalid convert directive ({input})")))?;

    let package = caps
        .get(1)
        .map(|m| m.as_str().trim_end_matches('.'))
        .unwrap_or("");
    let name = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    let mut identifiers = Vec::new();
    if let Some(extra) = caps.get(3) {
        let extra = extra.as_str();
        for ident in extra[1..extra.len() - 1].split(',') {
            let ident = ident.trim();
            if !is_exported_name(ident) {
                return Err(GenError::InvalidDirective(format!("invalid field name ({input})")));
            }
            identifiers.push(ident.to_string());
        }
    }

    if package.is_empty() {
        if !is_exported_name(name) {
            return Err(GenError::InvalidDirective(format!("invalid type name ({input})")));
        }
        let [source] = sources else {
            return Err(GenError::InvalidDirective(format!(
                "must provide path for multiple input packages ({input})"
            )));
        };
        return Ok(TypeTarget {
            name: TypeIdentity::new(source, name),
            identifiers,
        });
    }

    let mut found: Option<&String> = None;
    for source in sources {
        if has_base(source, package) {
            if found.is_some() {
                return Err(GenError::AmbiguousPath(package.to_string()));
            }
            found = Some(source);
        }
    }
    let Some(source) = found else {
        return Err(GenError::InvalidDirective(format!(
            "invalid package path ({package} not found in {})",
            sources.join(",")
        )));
    };
    if !is_exported_name(name) {
        return Err(GenError::InvalidDirective(format!("invalid type name ({name})")));
    }
    Ok(TypeTarget {
        name: TypeIdentity::new(source, name),
        identifiers,
    })
}

/// A parsed per-type mode directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeDirective {
    pub raw: String,
    pub mode: Mode,
    pub target: TypeTarget,
}

/// Parse a per-type directive; `Ok(None)` when it is not a mode directive.
pub fn parse_with_mode(
    sources: &[String],
    directive: &Directive,
) -> Result<Option<ModeDirective>, GenError> {
    let Some(mode) = Mode::from_directive(&directive.cmd) else {
        return Ok(None);
    };
    let target = parse_type_name(sources, &directive.arg)?;
    if mode != Mode::Update && !target.identifiers.is_empty() {
        return Err(GenError::InvalidDirective(format!(
            "invalid extra option ({})",
            directive.arg
        )));
    }
    Ok(Some(ModeDirective {
        raw: directive.raw(),
        mode,
        target,
    }))
}
