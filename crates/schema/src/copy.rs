use crate::apply::SchemaApplier;
use crate::store::{timed, Confirm, ConfirmPrompt};
use crate::types::Schema;

/// Source schema ready to be written to an empty target
#[derive(Debug, Clone, PartialEq)]
pub struct CopyPlan {
    pub source: String,
    pub target: String,
    pub schema: Schema,
}

/// Why a copy cannot start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyRefusal {
    /// The source has no schema or could not be read
    SourceMissing { source: String, reason: Option<String> },
    /// The target already holds rows
    TargetNotEmpty { target: String, rows: u64 },
    /// The target's row count could not be checked
    TargetUnreadable { target: String, reason: String },
}

impl std::fmt::Display for CopyRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceMissing {
                source,
                reason: None,
            } => write!(f, "Source namespace '{source}' has no schema or does not exist"),
            Self::SourceMissing {
                source,
                reason: Some(reason),
            } => write!(f, "Could not read schema of source namespace '{source}': {reason}"),
            Self::TargetNotEmpty { target, rows } => write!(
                f,
                "Target namespace '{target}' already has {rows} row(s); \
                 target namespace must be empty or non-existent"
            ),
            Self::TargetUnreadable { target, reason } => {
                write!(f, "Could not check whether '{target}' is empty: {reason}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Aborted,
    Copied,
    Failed(String),
}

impl CopyOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Failed(_) => 1,
            Self::Aborted | Self::Copied => 0,
        }
    }
}

impl SchemaApplier<'_> {
    /// Read the source schema and make sure the target holds no rows
    pub async fn plan_copy(&self, source: &str, target: &str) -> Result<CopyPlan, CopyRefusal> {
        let store = self.store();

        let schema = match timed("fetch schema", source, self.call_timeout(), store.fetch_schema(source)).await {
            Ok(Some(schema)) => schema,
            Ok(None) => {
                return Err(CopyRefusal::SourceMissing {
                    source: source.to_string(),
                    reason: None,
                })
            }
            Err(err) => {
                return Err(CopyRefusal::SourceMissing {
                    source: source.to_string(),
                    reason: Some(err.to_string()),
                })
            }
        };

        match timed("row count", target, self.call_timeout(), store.row_count(target)).await {
            Ok(Some(rows)) if rows > 0 => {
                return Err(CopyRefusal::TargetNotEmpty {
                    target: target.to_string(),
                    rows,
                })
            }
            Ok(_) => {}
            Err(err) => {
                return Err(CopyRefusal::TargetUnreadable {
                    target: target.to_string(),
                    reason: err.to_string(),
                })
            }
        }

        Ok(CopyPlan {
            source: source.to_string(),
            target: target.to_string(),
            schema,
        })
    }

    /// Confirm and create the target with the source schema
    pub async fn commit_copy(
        &self,
        plan: &CopyPlan,
        auto_confirm: bool,
        confirm: &dyn Confirm,
    ) -> CopyOutcome {
        let prompt = ConfirmPrompt::Copy {
            source: plan.source.clone(),
            target: plan.target.clone(),
        };
        if !auto_confirm && !confirm.confirm(&prompt) {
            return CopyOutcome::Aborted;
        }
        match self.write(&plan.target, &plan.schema).await {
            Ok(()) => CopyOutcome::Copied,
            Err(message) => CopyOutcome::Failed(message),
        }
    }
}
