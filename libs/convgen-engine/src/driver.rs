//! Generator driver: runs every stage over the generating packages and
//! hands the resolved plans to an emission sink.

use convgen_api::model::{ObjectModel, Package};
use convgen_api::plan::{
    ConversionDescriptor, ConversionPlan, ConvertPair, Embedding, FuncNames, Mode,
    PackageOutput, Registration,
};
use convgen_api::sink::EmissionSink;

use crate::context::GenContext;
use crate::directive::{self, has_base};
use crate::error::GenError;
use crate::matcher::{detect_embedding, plan_fields};
use crate::mode::{GeneratingPackage, TypeGen};
use crate::overrides;
use crate::pairing::boundary_pair;

/// Conversion generator over one object model.
#[derive(Debug)]
pub struct Generator<'m> {
    model: &'m ObjectModel,
    /// Generating package filter, matched by path suffix. Empty selects
    /// every package carrying a `gen:convert` directive.
    packages: Vec<String>,
}

impl<'m> Generator<'m> {
    pub fn new(model: &'m ObjectModel) -> Self {
        Self {
            model,
            packages: Vec::new(),
        }
    }

    pub fn with_packages(mut self, packages: Vec<String>) -> Self {
        self.packages = packages;
        self
    }

    fn selected(&self) -> Vec<&'m Package> {
        let mut selected: Vec<_> = self
            .model
            .packages
            .iter()
            .filter(|p| {
                if self.packages.is_empty() {
                    p.directives.iter().any(|d| d.cmd == directive::COMMAND)
                } else {
                    self.packages.iter().any(|f| has_base(&p.path, f))
                }
            })
            .collect();
        selected.sort_by(|a, b| a.path.cmp(&b.path));
        selected
    }

    /// Resolve every generating package into its output.
    pub fn generate(&self) -> Result<Vec<PackageOutput>, GenError> {
        let mut gpkgs = Vec::new();
        for package in self.selected() {
            tracing::debug!(package = %package.path, "prepare package");
            gpkgs.push(GeneratingPackage::prepare(self.model, package)?);
        }

        let mut ctx = GenContext::new(self.model);
        for gpkg in &gpkgs {
            for step in &gpkg.steps {
                for arg in &step.sources {
                    for out in &step.targets {
                        ctx.claim_package_pair(arg, out, &gpkg.path)?;
                    }
                }
            }
        }

        for gpkg in &mut gpkgs {
            overrides::resolve(&mut ctx, gpkg)?;
        }

        for gpkg in &gpkgs {
            for (source, gens) in &gpkg.gens {
                for g in gens.iter().filter(|g| g.mode == Mode::Type) {
                    let forward = ConvertPair::new(source.clone(), g.target.clone());
                    for pair in [forward.clone(), forward.reversed()] {
                        ctx.claim_generated(pair, &g.converter_package, &gpkg.path)?;
                    }
                }
            }
        }

        let mut outputs = Vec::with_capacity(gpkgs.len());
        for mut gpkg in gpkgs {
            let output = build_output(&ctx, &mut gpkg)
                .map_err(|e| e.with_context(format_args!("convert package {}", gpkg.path)))?;
            tracing::debug!(
                package = %output.package,
                plans = output.plans.len(),
                registrations = output.registrations.len(),
                "package resolved"
            );
            outputs.push(output);
        }
        Ok(outputs)
    }

    /// Generate and feed every package output to `sink`. Returns the number
    /// of conversion plans emitted.
    pub fn run<S: EmissionSink>(&self, mut sink: S) -> Result<usize, GenError> {
        let outputs = self.generate()?;
        let mut count = 0;
        for output in &outputs {
            sink.emit(output)
                .map_err(|e| GenError::from(e).with_context(format_args!("emit {}", output.package)))?;
            count += output.plans.len();
        }
        sink.finish()?;
        tracing::info!(packages = outputs.len(), conversions = count, "generation finished");
        Ok(count)
    }
}

fn build_output(ctx: &GenContext<'_>, gpkg: &mut GeneratingPackage) -> Result<PackageOutput, GenError> {
    let mut plans = Vec::new();
    for (source, gens) in &gpkg.gens {
        tracing::trace!(package = %gpkg.path, %source, "convert source");
        for g in gens {
            let pair = ConvertPair::new(g.target.clone(), source.clone());
            plans.push(build_plan(ctx, g, pair, &gpkg.path)?);
            if g.mode == Mode::Type {
                let pair = ConvertPair::new(source.clone(), g.target.clone());
                plans.push(build_plan(ctx, g, pair, &gpkg.path)?);
            }
        }
    }

    let mut registrations = Vec::new();
    for plan in &plans {
        let pair = &plan.descriptor.pair;
        let action = plan.descriptor.mode.action();
        registrations.push(Registration {
            pair: pair.clone(),
            action,
            function: plan.names.public.clone(),
            sequence: false,
        });
        if let Some(plural) = &plan.names.plural {
            registrations.push(Registration {
                pair: pair.clone(),
                action,
                function: plural.clone(),
                sequence: true,
            });
        }
    }
    for registration in &registrations {
        let (arg, out) = registration.signature();
        if boundary_pair(&arg, &out).is_none() {
            return Err(GenError::InvalidDirective(format!(
                "can not register {} ({arg} -> {out})",
                registration.function
            )));
        }
    }

    gpkg.custom_conversions.sort();
    gpkg.ignored_functions.sort();
    Ok(PackageOutput {
        package: gpkg.path.clone(),
        custom_conversions: std::mem::take(&mut gpkg.custom_conversions),
        ignored_functions: std::mem::take(&mut gpkg.ignored_functions),
        registrations,
        plans,
    })
}

fn build_plan(
    ctx: &GenContext<'_>,
    g: &TypeGen,
    pair: ConvertPair,
    package: &str,
) -> Result<ConversionPlan, GenError> {
    let context = |e: GenError| e.with_context(format_args!("can not convert between {} and {}", pair.arg, pair.out));

    let embedding = if g.mode == Mode::Type {
        detect_embedding(ctx, &pair).map_err(context)?
    } else {
        Embedding::None
    };
    let fields = plan_fields(ctx, g.mode, &pair, &embedding, &g.identifiers).map_err(context)?;

    let entry = ctx.pair(&pair);
    let descriptor = ConversionDescriptor {
        custom: entry.and_then(|e| e.custom.clone()),
        converter_package: entry.and_then(|e| e.converter_package.clone()),
        mode: g.mode,
        pair,
    };
    let names = FuncNames::new(&descriptor.pair, g.mode, package);
    tracing::trace!(
        function = %names.public,
        custom = descriptor.custom.is_some(),
        fields = fields.len(),
        "conversion planned"
    );
    Ok(ConversionPlan {
        descriptor,
        names,
        embedding,
        fields,
    })
}
