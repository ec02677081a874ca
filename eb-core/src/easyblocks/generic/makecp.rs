// eb-core/src/easyblocks/generic/makecp.rs
use std::path::{Path, PathBuf};

use eb_common::easyconfig::Value;
use eb_common::error::{EbError, Result};

use super::configuremake::run_make;
use crate::build::context::BuildContext;
use crate::easyblocks::EasyBlock;

/// `make`, then copies `files_to_copy` into the installation directory.
pub struct MakeCp;

impl EasyBlock for MakeCp {
    fn name(&self) -> &'static str {
        "MakeCp"
    }

    fn parent(&self) -> &'static str {
        "ConfigureMake"
    }

    fn location(&self) -> &'static str {
        module_path!()
    }

    fn build_step(&self, ctx: &mut BuildContext) -> Result<()> {
        run_make(ctx)
    }

    fn install_step(&self, ctx: &mut BuildContext) -> Result<()> {
        let entries = copy_entries(&ctx.ec.get("files_to_copy"))?;
        if entries.is_empty() {
            return Err(EbError::EasyConfig(
                ctx.ec.filename(),
                "'files_to_copy' must list the files to install".to_string(),
            ));
        }
        for (sources, target) in entries {
            let target_dir = match &target {
                Some(sub) => ctx.install_dir.join(sub),
                None => ctx.install_dir.clone(),
            };
            for source in sources {
                let src = resolve_source(&ctx.start_dir, &source);
                if !ctx.dry_run && !src.exists() {
                    return Err(EbError::NotFound(format!(
                        "File to copy {} does not exist",
                        src.display()
                    )));
                }
                let file_name = src
                    .file_name()
                    .ok_or_else(|| EbError::Generic(format!("Invalid path to copy: {source}")))?;
                ctx.copy(&src, &target_dir.join(file_name))?;
            }
        }
        Ok(())
    }
}

fn resolve_source(start_dir: &Path, source: &str) -> PathBuf {
    let path = Path::new(source);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        start_dir.join(path)
    }
}

/// `files_to_copy` entries: a path, or `(paths, target subdirectory)`.
fn copy_entries(value: &Value) -> Result<Vec<(Vec<String>, Option<String>)>> {
    let Some(items) = value.as_seq() else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .map(|item| match item {
            Value::Str(path) => Ok((vec![path.clone()], None)),
            Value::Tuple(parts) if parts.len() == 2 => {
                let sources = match &parts[0] {
                    Value::Str(path) => vec![path.clone()],
                    other => other
                        .as_seq()
                        .map(|paths| paths.iter().map(Value::to_plain_string).collect())
                        .unwrap_or_default(),
                };
                Ok((sources, parts[1].as_str().map(str::to_string)))
            }
            other => Err(EbError::Generic(format!(
                "Invalid 'files_to_copy' entry {other}"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_copy_entries() {
        let value = Value::List(vec![
            Value::Str("README".into()),
            Value::Tuple(vec![
                Value::List(vec![Value::Str("tool".into()), Value::Str("helper".into())]),
                Value::Str("bin".into()),
            ]),
        ]);
        let entries = copy_entries(&value).unwrap();
        assert_eq!(entries[0], (vec!["README".to_string()], None));
        assert_eq!(
            entries[1],
            (
                vec!["tool".to_string(), "helper".to_string()],
                Some("bin".to_string())
            )
        );
        assert!(copy_entries(&Value::List(vec![Value::Int(3)])).is_err());
    }
}
