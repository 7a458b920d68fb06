//! Emission sinks: JSON plan dumps and plain-text reports.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use convgen_api::error::ConvertError;
use convgen_api::model::{TypeIdentity, TypeRef, base_name};
use convgen_api::naming::{plural, type_fragment, type_string};
use convgen_api::plan::{
    ConversionPlan, Embedding, FieldConversion, FieldValue, Mode, Note, PackageOutput,
};
use convgen_api::sink::EmissionSink;

const NAME_WIDTH: usize = 16;

/// File stem for a package path: `example.com/a/b` → `example.com_a_b`.
pub fn file_stem(package: &str) -> String {
    package.replace(['/', ':'], "_")
}

/// Writes `<stem>.plan.json` per package.
#[derive(Debug)]
pub struct JsonSink {
    dir: PathBuf,
}

impl JsonSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl EmissionSink for JsonSink {
    fn emit(&mut self, output: &PackageOutput) -> Result<(), ConvertError> {
        let json = serde_json::to_string_pretty(output)?;
        write_file(&self.dir, &format!("{}.plan.json", file_stem(&output.package)), &json)
    }
}

/// Writes `<stem>.report.txt` per package, or to stdout when no directory
/// is given.
#[derive(Debug, Default)]
pub struct ReportSink {
    dir: Option<PathBuf>,
}

impl ReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn stdout() -> Self {
        Self { dir: None }
    }
}

impl EmissionSink for ReportSink {
    fn emit(&mut self, output: &PackageOutput) -> Result<(), ConvertError> {
        let report = render_report(output);
        match &self.dir {
            Some(dir) => write_file(dir, &format!("{}.report.txt", file_stem(&output.package)), &report),
            None => {
                print!("{report}");
                Ok(())
            }
        }
    }
}

/// Fans every output out to several sinks.
#[derive(Default)]
pub struct MultiSink<'a> {
    sinks: Vec<Box<dyn EmissionSink + 'a>>,
}

impl<'a> MultiSink<'a> {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn push(&mut self, sink: impl EmissionSink + 'a) {
        self.sinks.push(Box::new(sink));
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EmissionSink for MultiSink<'_> {
    fn emit(&mut self, output: &PackageOutput) -> Result<(), ConvertError> {
        self.sinks.iter_mut().try_for_each(|s| s.emit(output))
    }

    fn finish(&mut self) -> Result<(), ConvertError> {
        self.sinks.iter_mut().try_for_each(|s| s.finish())
    }
}

fn write_file(dir: &Path, name: &str, content: &str) -> Result<(), ConvertError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, content).map_err(|e| ConvertError::from(e).with_context(path.display()))?;
    tracing::debug!(path = %path.display(), "written");
    Ok(())
}

fn notes(out: &mut String, title: &str, notes: &[Note]) {
    out.push_str(title);
    if notes.is_empty() {
        out.push_str(" (none)\n");
        return;
    }
    out.push('\n');
    for note in notes {
        let _ = writeln!(out, "    {:<NAME_WIDTH$}    // {}", note.name, note.comment);
    }
}

/// Plain-text report of one package output.
///
/// Starts with the custom-conversion comment block, then the registration
/// routine, then every conversion grouped by source type.
pub fn render_report(output: &PackageOutput) -> String {
    let package = output.package.as_str();
    let mut out = String::new();
    let _ = writeln!(out, "// package {package}");
    out.push_str("/*\n");
    notes(&mut out, "Custom conversions:", &output.custom_conversions);
    out.push('\n');
    notes(&mut out, "Ignored functions:", &output.ignored_functions);
    out.push_str("*/\n\n");

    out.push_str("Registrations:\n");
    for r in &output.registrations {
        let (arg, out_ty) = r.signature();
        let _ = writeln!(
            out,
            "    {:<NAME_WIDTH$}    ({} -> {})",
            r.function,
            render_type(&arg, package),
            render_type(&out_ty, package)
        );
    }

    let mut current: Option<&TypeIdentity> = None;
    let mut plans = output.plans.iter().peekable();
    while let Some(plan) = plans.next() {
        // The directive-bearing direction comes first; its output is the source.
        let source = &plan.descriptor.pair.out;
        if current != Some(source) {
            let _ = writeln!(out, "\n//-- convert {source} --//");
            current = Some(source);
        }
        render_plan(&mut out, plan, package);
        if plan.descriptor.mode == Mode::Type {
            if let Some(back) = plans.next() {
                render_plan(&mut out, back, package);
            }
        }
    }
    out
}

fn render_type(ty: &TypeRef, package: &str) -> String {
    match ty {
        TypeRef::Named(id) => type_string(id, package),
        TypeRef::Ref(inner) => format!("*{}", render_type(inner, package)),
        TypeRef::Seq(inner) => format!("[]{}", render_type(inner, package)),
        TypeRef::Map(k, v) => format!("map[{}]{}", render_type(k, package), render_type(v, package)),
        other => other.to_string(),
    }
}

fn render_plan(out: &mut String, plan: &ConversionPlan, package: &str) {
    let pair = &plan.descriptor.pair;
    let arg = type_string(&pair.arg, package);
    let out_ty = type_string(&pair.out, package);
    let _ = writeln!(out, "\nfunc {}(arg *{arg}, out *{out_ty}) *{out_ty}", plan.names.public);
    match &plan.descriptor.custom {
        Some(custom) => {
            let _ = writeln!(
                out,
                "    // delegates to {} (shape {})",
                custom.name,
                custom.shape.number()
            );
        }
        None => {
            let _ = writeln!(out, "    // calls {}", plan.names.body);
        }
    }

    let _ = writeln!(out, "func {}(arg *{arg}, out *{out_ty})", plan.names.body);
    match &plan.embedding {
        Embedding::None => {}
        Embedding::Arg(field) => {
            let value = if matches!(field.ty, TypeRef::Ref(_)) { "*" } else { "" };
            let _ = writeln!(out, "    *out = {value}arg.{}    // embedded", field.name);
        }
        Embedding::Out(field) => {
            let value = if matches!(field.ty, TypeRef::Ref(_)) { "arg" } else { "*arg" };
            let _ = writeln!(out, "    out.{} = {value}    // embedded", field.name);
        }
    }
    for field in &plan.fields {
        let _ = writeln!(out, "    {}", render_field(field, package));
    }

    if let Some(plural) = &plan.names.plural {
        let _ = writeln!(out, "func {plural}(args []*{arg}) []*{out_ty}");
    }
}

/// One field assignment with its diagnostic comment.
pub fn render_field(field: &FieldConversion, package: &str) -> String {
    let name = &field.out.name;
    let arg = field.arg.as_ref().map(|a| a.name.as_str()).unwrap_or(name);
    let value = match &field.value {
        FieldValue::NoChange | FieldValue::Identifier | FieldValue::Mismatch => format!("out.{name}"),
        FieldValue::Assign => format!("arg.{arg}"),
        FieldValue::Apply { .. } => format!("arg.{arg}.Apply(out.{name})"),
        FieldValue::Cast { kind } => {
            let ty = match &field.out.ty {
                TypeRef::Named(id) => type_string(id, package),
                _ => kind.name().to_string(),
            };
            format!("{ty}(arg.{arg})")
        }
        FieldValue::Delegate {
            pair,
            sequence,
            converter_package,
        } => {
            let mut arg_str = type_fragment(&pair.arg, package);
            let mut out_str = type_fragment(&pair.out, package);
            if *sequence {
                arg_str = plural(&arg_str);
                out_str = plural(&out_str);
            }
            let call = if *sequence {
                format!("Convert_{arg_str}_{out_str}(arg.{arg})")
            } else {
                format!("Convert_{arg_str}_{out_str}(arg.{arg}, nil)")
            };
            if converter_package == package {
                call
            } else {
                format!("{}.{call}", base_name(converter_package))
            }
        }
    };
    match field.value.comment() {
        Some(comment) => format!("out.{name} = {value} {comment}"),
        None => format!("out.{name} = {value}"),
    }
}
