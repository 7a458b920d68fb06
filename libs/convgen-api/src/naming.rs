//! Names of generated conversion functions.

use crate::model::{TypeIdentity, base_name};

/// Type as written from inside `current`: bare for local types,
/// `pkgbase.Name` for foreign ones.
pub fn type_string(id: &TypeIdentity, current: &str) -> String {
    if id.package == current {
        id.name.clone()
    } else {
        format!("{}.{}", base_name(&id.package), id.name)
    }
}

/// Type string with package separators normalized for use inside a
/// function name (`pkg.Name` → `pkg_Name`).
pub fn type_fragment(id: &TypeIdentity, current: &str) -> String {
    type_string(id, current).replace('.', "_")
}

/// English plural of an identifier fragment, with the irregular and
/// uncountable nouns of the pluralize rule set.
pub fn plural(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    pluralizer::pluralize(word, 2, false)
}
