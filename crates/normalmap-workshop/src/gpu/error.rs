use std::fmt;

use naga::ShaderStage;

/// Category of an error the driver reported through an error scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Validation,
    OutOfMemory,
}

/// One error drained from the driver, with the operation that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub label: String,
    pub message: String,
}

impl DriverError {
    pub fn from_wgpu(label: &str, err: &wgpu::Error) -> Self {
        let kind = match err {
            wgpu::Error::OutOfMemory { .. } => DriverErrorKind::OutOfMemory,
            _ => DriverErrorKind::Validation,
        };
        Self {
            kind,
            label: label.to_string(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DriverErrorKind::Validation => "validation",
            DriverErrorKind::OutOfMemory => "out of memory",
        };
        write!(f, "[{kind}] {}: {}", self.label, self.message)
    }
}

/// Every error pending since the last drain, in emission order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} driver error(s){}", .0.len(), list_errors(.0))]
pub struct DriverErrors(pub Vec<DriverError>);

fn list_errors(errors: &[DriverError]) -> String {
    errors.iter().map(|e| format!("\n  {e}")).collect()
}

impl DriverErrors {
    /// `Ok` when nothing is pending.
    pub fn check(errors: Vec<DriverError>) -> Result<(), DriverErrors> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DriverErrors(errors))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("{stage:?} shader '{label}' has empty source")]
    EmptyShaderSource { stage: ShaderStage, label: String },
    #[error("{stage:?} shader '{label}' failed to compile:\n{diagnostic}")]
    ShaderCompile {
        stage: ShaderStage,
        label: String,
        diagnostic: String,
    },
    #[error("shader '{label}' has no {stage:?} entry point")]
    MissingEntryPoint { stage: ShaderStage, label: String },
    #[error("program '{label}' failed to link: {diagnostic}")]
    ProgramLink { label: String, diagnostic: String },
    #[error("invalid texture size {width}x{height} for '{label}'")]
    InvalidDimensions {
        label: String,
        width: u32,
        height: u32,
    },
    #[error("texture '{label}' expects {expected} bytes of pixel data, got {actual}")]
    PixelDataSize {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("uniform '{name}' not found in shader '{label}'")]
    UniformNotFound { label: String, name: String },
    #[error(transparent)]
    Driver(#[from] DriverErrors),
}

impl ResourceError {
    /// Human-readable diagnostic; never empty.
    pub fn diagnostic(&self) -> String {
        self.to_string()
    }
}
