//! User-supplied conversion functions found in generating packages.

use convgen_api::model::{FuncDecl, TypeRef};
use convgen_api::plan::{CustomFunc, CustomShape, Note};

use crate::context::GenContext;
use crate::error::GenError;
use crate::mode::GeneratingPackage;
use crate::pairing::pair_with_ref;

const NOT_RECOGNIZED: &str = "not recognized";
const NOT_NAMED: &str = "params are not references to named types";
const IN_USE: &str = "in use";
const NOT_IN_USE: &str = "not use, no conversions between params";

/// Signature shape of `func`, with its input and output parameter types.
///
/// Receiver functions are never candidates.
pub fn classify(func: &FuncDecl) -> Option<(CustomShape, &TypeRef, &TypeRef)> {
    if func.receiver.is_some() {
        return None;
    }
    match (func.params.as_slice(), func.results.as_slice()) {
        ([arg], [out]) => Some((CustomShape::Transform, arg, out)),
        ([arg, out], []) => Some((CustomShape::Mutate, arg, out)),
        ([arg, out], [result]) => match (out, result) {
            (TypeRef::Ref(a), TypeRef::Ref(b)) if a == b => {
                Some((CustomShape::MutateReturn, arg, out))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Register the custom functions declared in `gpkg` and record their
/// diagnostics on it. Functions are visited in name order.
pub fn resolve(ctx: &mut GenContext<'_>, gpkg: &mut GeneratingPackage) -> Result<(), GenError> {
    let model = ctx.model();
    let Some(package) = model.package(&gpkg.path) else {
        return Err(GenError::PackageNotFound(gpkg.path.clone()));
    };

    let mut functions: Vec<&FuncDecl> = package
        .functions
        .iter()
        .filter(|f| f.receiver.is_none())
        .collect();
    functions.sort_by(|a, b| a.name.cmp(&b.name));

    for func in functions {
        let Some((shape, arg, out)) = classify(func) else {
            tracing::debug!(package = %gpkg.path, function = %func.name, "ignore function: signature not recognized");
            gpkg.ignored_functions.push(Note::new(&func.name, NOT_RECOGNIZED));
            continue;
        };
        let Some(pair) = pair_with_ref(model, arg, out) else {
            tracing::debug!(package = %gpkg.path, function = %func.name, "ignore function: {NOT_NAMED}");
            gpkg.ignored_functions.push(Note::new(&func.name, NOT_NAMED));
            continue;
        };

        if let Some(owner) = ctx.package_owner(&pair.arg.package, &pair.out.package) {
            if owner != gpkg.path {
                return Err(GenError::OwnershipViolation {
                    function: func.name.clone(),
                    arg: pair.arg.name.clone(),
                    out: pair.out.name.clone(),
                    expected: owner.to_string(),
                    found: gpkg.path.clone(),
                });
            }
        }

        let comment = if gpkg.converts_between(&pair.arg, &pair.out) {
            IN_USE
        } else {
            NOT_IN_USE
        };
        tracing::debug!(
            package = %gpkg.path,
            function = %func.name,
            shape = shape.number(),
            %pair,
            comment,
            "custom conversion"
        );
        ctx.claim_custom(
            pair,
            CustomFunc {
                package: gpkg.path.clone(),
                name: func.name.clone(),
                shape,
            },
        )?;
        gpkg.custom_conversions.push(Note::new(&func.name, comment));
    }
    Ok(())
}
