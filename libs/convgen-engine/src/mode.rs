//! Mode selection: which source types each generating package converts,
//! and how.

use std::collections::{BTreeMap, BTreeSet};

use convgen_api::model::{ObjectModel, Package, TypeDecl, TypeIdentity};
use convgen_api::plan::{Mode, Note};

use crate::directive::{self, ConvertScope, parse_convert_directive, parse_with_mode, validate_equality};
use crate::error::GenError;

/// One declared conversion between a source type and a directive-bearing
/// target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeGen {
    pub mode: Mode,
    /// Type carrying the directive (or matched by name in auto mode).
    pub target: TypeIdentity,
    /// Update-mode identifier fields.
    pub identifiers: Vec<String>,
    /// Package emitting the generated functions.
    pub converter_package: String,
}

/// A package carrying `gen:convert` directives, with its resolved gens.
#[derive(Debug, Clone, Default)]
pub struct GeneratingPackage {
    pub path: String,
    pub steps: Vec<ConvertScope>,
    /// Keyed by source type.
    pub gens: BTreeMap<TypeIdentity, Vec<TypeGen>>,
    /// Every public type of the source packages seen so far.
    pub known: BTreeSet<TypeIdentity>,
    pub custom_conversions: Vec<Note>,
    pub ignored_functions: Vec<Note>,
}

impl GeneratingPackage {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Resolve every `gen:convert` directive of `package`.
    pub fn prepare(model: &ObjectModel, package: &Package) -> Result<Self, GenError> {
        let mut gpkg = Self::new(&package.path);
        for d in package.directives.iter().filter(|d| d.cmd == directive::COMMAND) {
            let scope = parse_convert_directive(&d.arg)?;
            gpkg.plan_step(model, scope)?;
        }
        if gpkg.steps.is_empty() {
            return Err(GenError::InvalidDirective(format!(
                "convert package {}: invalid directive (must in format pkg1 -> pkg2)",
                package.path
            )));
        }
        Ok(gpkg)
    }

    /// Resolve one package scope: record the public source types and
    /// attach a gen for every directive (or auto match) on a target type.
    pub fn plan_step(&mut self, model: &ObjectModel, scope: ConvertScope) -> Result<(), GenError> {
        tracing::debug!(
            package = %self.path,
            sources = %scope.sources.join(","),
            targets = %scope.targets.join(","),
            "convert step"
        );
        let self_mapping = validate_equality(&scope.sources, &scope.targets)?;
        let auto = !self_mapping && scope.sources.len() == 1 && scope.targets.len() == 1;

        let sources = resolve_packages(model, &scope.sources)?;
        let targets = resolve_packages(model, &scope.targets)?;

        for source in &sources {
            for decl in source.types.iter().filter(|t| t.public) {
                let id = TypeIdentity::new(&source.path, &decl.name);
                tracing::trace!(object = %id, "source object");
                self.known.insert(id);
            }
        }

        for target in &targets {
            let mut decls: Vec<&TypeDecl> = target
                .types
                .iter()
                .filter(|t| t.public && t.is_record())
                .collect();
            decls.sort_by(|a, b| a.name.cmp(&b.name));

            for decl in decls {
                let target_id = TypeIdentity::new(&target.path, &decl.name);
                tracing::trace!(object = %target_id, directives = ?decl.directives, "target object");

                let mut explicit = false;
                for d in &decl.directives {
                    let Some(parsed) = parse_with_mode(&scope.sources, d)? else {
                        continue;
                    };
                    let source = parsed.target.name;
                    if !self.known.contains(&source) {
                        return Err(GenError::TypeNotFound {
                            name: source.to_string(),
                            directive: parsed.raw,
                        });
                    }
                    ensure_record(model, &source)?;
                    tracing::trace!(%source, mode = %parsed.mode, "parsed type");
                    explicit = true;
                    self.push_gen(
                        source,
                        TypeGen {
                            mode: parsed.mode,
                            target: target_id.clone(),
                            identifiers: parsed.target.identifiers,
                            converter_package: self.path.clone(),
                        },
                    );
                }

                if !explicit && auto {
                    let source = TypeIdentity::new(&sources[0].path, &decl.name);
                    if !self.known.contains(&source) {
                        continue;
                    }
                    ensure_record(model, &source)?;
                    self.push_gen(
                        source,
                        TypeGen {
                            mode: Mode::Type,
                            target: target_id,
                            identifiers: Vec::new(),
                            converter_package: self.path.clone(),
                        },
                    );
                }
            }
        }

        self.steps.push(scope);
        Ok(())
    }

    fn push_gen(&mut self, source: TypeIdentity, generation: TypeGen) {
        self.gens.entry(source).or_default().push(generation);
    }

    /// Whether any gen of this package converts between `a` and `b`, in
    /// either direction.
    pub fn converts_between(&self, a: &TypeIdentity, b: &TypeIdentity) -> bool {
        [(a, b), (b, a)].into_iter().any(|(source, target)| {
            self.gens
                .get(source)
                .is_some_and(|gens| gens.iter().any(|g| &g.target == target))
        })
    }
}

fn resolve_packages<'m>(model: &'m ObjectModel, paths: &[String]) -> Result<Vec<&'m Package>, GenError> {
    paths
        .iter()
        .map(|p| model.package(p).ok_or_else(|| GenError::PackageNotFound(p.clone())))
        .collect()
}

fn ensure_record(model: &ObjectModel, id: &TypeIdentity) -> Result<(), GenError> {
    match model.type_decl(id) {
        Some(decl) if decl.is_record() => Ok(()),
        _ => Err(GenError::NotARecord(id.name.clone())),
    }
}
