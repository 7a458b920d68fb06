use crate::error::ConvertError;
use crate::plan::PackageOutput;

/// Receives the resolved output of each generating package, in package
/// order. Rendering source text is the sink's business.
pub trait EmissionSink {
    fn emit(&mut self, output: &PackageOutput) -> Result<(), ConvertError>;

    /// Called once after the last package.
    fn finish(&mut self) -> Result<(), ConvertError> {
        Ok(())
    }
}

impl<S: EmissionSink + ?Sized> EmissionSink for &mut S {
    fn emit(&mut self, output: &PackageOutput) -> Result<(), ConvertError> {
        (**self).emit(output)
    }

    fn finish(&mut self) -> Result<(), ConvertError> {
        (**self).finish()
    }
}
