use std::collections::BTreeMap;

use convgen_api::model::ObjectModel;
use convgen_api::plan::{ConvertPair, CustomFunc};

use crate::error::GenError;

/// Known conversion for one pair key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairEntry {
    /// User override owning the pair.
    pub custom: Option<CustomFunc>,
    /// Package generating Type-mode functions for the pair.
    pub converter_package: Option<String>,
}

/// State shared by every stage of one generation run.
#[derive(Debug)]
pub struct GenContext<'m> {
    model: &'m ObjectModel,
    pairs: BTreeMap<ConvertPair, PairEntry>,
    /// (arg package, out package) → generating package.
    package_owners: BTreeMap<(String, String), String>,
}

impl<'m> GenContext<'m> {
    pub fn new(model: &'m ObjectModel) -> Self {
        Self {
            model,
            pairs: BTreeMap::new(),
            package_owners: BTreeMap::new(),
        }
    }

    pub fn model(&self) -> &'m ObjectModel {
        self.model
    }

    pub fn pair(&self, pair: &ConvertPair) -> Option<&PairEntry> {
        self.pairs.get(pair)
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&ConvertPair, &PairEntry)> {
        self.pairs.iter()
    }

    /// Record a user override. Two overrides for one pair is an error.
    pub fn claim_custom(&mut self, pair: ConvertPair, func: CustomFunc) -> Result<(), GenError> {
        let entry = self.pairs.entry(pair.clone()).or_default();
        if let Some(first) = &entry.custom {
            return Err(GenError::DuplicateConversion {
                arg: format!("*{}", pair.arg),
                out: format!("*{}", pair.out),
                first: first.name.clone(),
                second: func.name,
            });
        }
        entry.custom = Some(func);
        Ok(())
    }

    /// Record the package generating the Type-mode functions of `pair`.
    ///
    /// `origin` names the declaration; a second declaration of the same
    /// pair is an error.
    pub fn claim_generated(
        &mut self,
        pair: ConvertPair,
        package: &str,
        origin: &str,
    ) -> Result<(), GenError> {
        let entry = self.pairs.entry(pair.clone()).or_default();
        if let Some(existing) = &entry.converter_package {
            return Err(GenError::DuplicateDeclaration {
                arg: pair.arg.to_string(),
                out: pair.out.to_string(),
                first: existing.clone(),
                second: origin.to_string(),
            });
        }
        entry.converter_package = Some(package.to_string());
        Ok(())
    }

    /// Assign a package pair (and its reverse) to a generating package.
    pub fn claim_package_pair(
        &mut self,
        arg: &str,
        out: &str,
        owner: &str,
    ) -> Result<(), GenError> {
        for key in [
            (arg.to_string(), out.to_string()),
            (out.to_string(), arg.to_string()),
        ] {
            if let Some(first) = self.package_owners.get(&key) {
                if first != owner {
                    return Err(GenError::DuplicatePackagePair {
                        arg: arg.to_string(),
                        out: out.to_string(),
                        first: first.clone(),
                        second: owner.to_string(),
                    });
                }
            }
            self.package_owners.insert(key, owner.to_string());
        }
        Ok(())
    }

    /// Generating package owning conversions from `arg` to `out`.
    pub fn package_owner(&self, arg: &str, out: &str) -> Option<&str> {
        self.package_owners
            .get(&(arg.to_string(), out.to_string()))
            .map(String::as_str)
    }
}
