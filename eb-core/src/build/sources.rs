// eb-core/src/build/sources.rs
//! Obtaining, unpacking and patching the files an easyconfig lists.
use std::fs;
use std::path::{Path, PathBuf};

use eb_aio::checksum::verify_checksum_sync;
use eb_aio::extract::{extract_archive, is_archive};
use eb_common::config::Config;
use eb_common::easyconfig::PatchFile;
use eb_common::error::{EbError, Result};
use eb_common::EasyConfig;
use eb_net::http::{fetch_all, SourceRequest};
use regex::Regex;
use tracing::{debug, info};

use super::context::BuildContext;

/// Highest `-p` level tried when guessing how to apply a patch.
const MAX_PATCH_LEVEL: u32 = 5;

/// Where a file named `filename` of `ec` may already be: the source path, the
/// directory of the easyconfig, then the robot paths.
pub fn locate_file(config: &Config, ec: &EasyConfig, filename: &str) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = config
        .source_dirs(&ec.name)
        .into_iter()
        .map(|dir| dir.join(filename))
        .collect();
    if let Some(dir) = ec.path.as_deref().and_then(Path::parent) {
        candidates.push(dir.join(filename));
    }
    let letter = ec
        .name
        .chars()
        .next()
        .map(|c| c.to_ascii_lowercase().to_string())
        .unwrap_or_default();
    for robot in &config.robot_paths {
        candidates.push(robot.join(&letter).join(&ec.name).join(filename));
        candidates.push(robot.join(&ec.name).join(filename));
        candidates.push(robot.join(filename));
    }
    candidates.into_iter().find(|p| p.is_file())
}

struct WantedFile {
    filename: String,
    download_filename: Option<String>,
    urls: Vec<String>,
    checksums: Vec<String>,
}

/// Finds or downloads every source and patch, verifying checksums where given.
pub async fn fetch_step(ctx: &mut BuildContext<'_>) -> Result<()> {
    let sources = ctx.ec.sources()?;
    let patches = ctx.ec.patches()?;
    let default_urls = ctx.ec.source_urls();

    let mut wanted: Vec<WantedFile> = Vec::new();
    for src in &sources {
        wanted.push(WantedFile {
            filename: src.filename.clone(),
            download_filename: src.download_filename.clone(),
            urls: if src.source_urls.is_empty() {
                default_urls.clone()
            } else {
                src.source_urls.clone()
            },
            checksums: Vec::new(),
        });
    }
    for patch in &patches {
        wanted.push(WantedFile {
            filename: patch.filename.clone(),
            download_filename: None,
            urls: default_urls.clone(),
            checksums: Vec::new(),
        });
    }
    for (index, file) in wanted.iter_mut().enumerate() {
        file.checksums = ctx.ec.checksums_for(index, &file.filename);
    }

    let store_dir = ctx.config.source_store_dir(&ctx.ec.name);
    let mut located: Vec<Option<PathBuf>> = Vec::with_capacity(wanted.len());
    let mut requests = Vec::new();
    for file in &wanted {
        match locate_file(ctx.config, &ctx.ec, &file.filename) {
            Some(path) => {
                debug!("Found {} at {}", file.filename, path.display());
                if !ctx.dry_run {
                    verify_checksum_sync(&path, &file.checksums)?;
                }
                located.push(Some(path));
            }
            None => {
                if file.urls.is_empty() {
                    return Err(EbError::NotFound(format!(
                        "Couldn't find file {} anywhere, and no source_urls to download it from",
                        file.filename
                    )));
                }
                requests.push(SourceRequest {
                    filename: file.filename.clone(),
                    download_filename: file.download_filename.clone(),
                    urls: file.urls.clone(),
                    dest_dir: store_dir.clone(),
                    checksums: file.checksums.clone(),
                });
                located.push(None);
            }
        }
    }

    if ctx.dry_run {
        let paths: Vec<PathBuf> = located
            .iter()
            .zip(&wanted)
            .map(|(path, file)| path.clone().unwrap_or_else(|| store_dir.join(&file.filename)))
            .collect();
        report_dry_run(ctx, &requests, &paths, sources.len());
        assign(ctx, paths, patches);
        return Ok(());
    }

    if !requests.is_empty() {
        info!(
            "Downloading {} file(s) for {}",
            requests.len(),
            ctx.ec.full_mod_name()
        );
        ctx.log(&format!(
            "Downloading {}",
            requests
                .iter()
                .map(|r| r.filename.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    let mut downloaded = fetch_all(&requests).await?.into_iter();
    let mut paths = Vec::with_capacity(located.len());
    for path in located {
        match path.or_else(|| downloaded.next()) {
            Some(path) => paths.push(path),
            None => {
                return Err(EbError::Generic(
                    "Fewer downloads than requested files".to_string(),
                ))
            }
        }
    }
    assign(ctx, paths, patches);
    Ok(())
}

fn assign(ctx: &mut BuildContext<'_>, mut paths: Vec<PathBuf>, patches: Vec<PatchFile>) {
    let patch_paths = paths.split_off(paths.len() - patches.len());
    ctx.sources = paths;
    ctx.patches = patches.into_iter().zip(patch_paths).collect();
}

fn report_dry_run(ctx: &BuildContext<'_>, requests: &[SourceRequest], paths: &[PathBuf], n_sources: usize) {
    if !requests.is_empty() {
        ctx.dry_run_msg("Available download URLs for sources/patches:");
        for req in requests {
            for url in req.candidate_urls() {
                ctx.dry_run_msg(&format!("  * {url}"));
            }
        }
        println!();
    }
    let (sources, patches) = paths.split_at(n_sources.min(paths.len()));
    ctx.dry_run_msg("List of sources:");
    for path in sources {
        ctx.dry_run_msg(&format!("  * {}", path.display()));
    }
    if !patches.is_empty() {
        println!();
        ctx.dry_run_msg("List of patches:");
        for path in patches {
            ctx.dry_run_msg(&format!("  * {}", path.display()));
        }
    }
}

/// Unpacks every source into the build directory and settles the start directory.
pub fn unpack_sources(ctx: &mut BuildContext<'_>) -> Result<()> {
    let build_dir = ctx.build_dir.clone();
    let extract_cmds: Vec<Option<String>> = ctx
        .ec
        .sources()?
        .into_iter()
        .map(|s| s.extract_cmd)
        .collect();
    for (index, src) in ctx.sources.clone().iter().enumerate() {
        let extract_cmd = extract_cmds.get(index).cloned().flatten();
        if let Some(cmd) = extract_cmd {
            let cmd = cmd.replace("%s", &src.display().to_string());
            ctx.run_cmd(&cmd, &build_dir)?;
        } else if is_archive(src) {
            if ctx.dry_run {
                ctx.dry_run_msg(&format!(
                    "  {} unpacked to {}",
                    src.display(),
                    build_dir.display()
                ));
            } else {
                ctx.log(&format!("Unpacking {} to {}", src.display(), build_dir.display()));
                extract_archive(src, &build_dir, 0)?;
            }
        } else {
            let file_name = src
                .file_name()
                .ok_or_else(|| EbError::Generic(format!("Invalid source path {}", src.display())))?;
            ctx.copy(src, &build_dir.join(file_name))?;
        }
    }
    ctx.start_dir = determine_start_dir(ctx)?;
    debug!("Start directory for {}: {}", ctx.ec.full_mod_name(), ctx.start_dir.display());
    Ok(())
}

/// `start_dir` if set (relative to the build directory unless absolute); otherwise the
/// single top-level directory the sources unpacked to, or the build directory itself.
fn determine_start_dir(ctx: &BuildContext<'_>) -> Result<PathBuf> {
    if let Some(start_dir) = ctx.ec.get_opt_str("start_dir").filter(|s| !s.is_empty()) {
        let path = Path::new(&start_dir);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            ctx.build_dir.join(path)
        };
        if !ctx.dry_run && !path.is_dir() {
            return Err(EbError::NotFound(format!(
                "Specified start dir {} does not exist",
                path.display()
            )));
        }
        return Ok(path);
    }
    if ctx.dry_run {
        return Ok(guess_unpacked_dir(&ctx.build_dir, ctx.sources.first()));
    }
    single_subdir(&ctx.build_dir)
}

fn single_subdir(build_dir: &Path) -> Result<PathBuf> {
    let mut subdirs = Vec::new();
    let mut has_files = false;
    for entry in fs::read_dir(build_dir)?.flatten() {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else {
            has_files = true;
        }
    }
    if subdirs.len() == 1 && !has_files {
        Ok(subdirs.remove(0))
    } else {
        Ok(build_dir.to_path_buf())
    }
}

/// Directory an archive most likely unpacks to, e.g. `bzip2-1.0.8` for `bzip2-1.0.8.tar.gz`.
fn guess_unpacked_dir(build_dir: &Path, first_source: Option<&PathBuf>) -> PathBuf {
    let Some(name) = first_source
        .filter(|p| is_archive(p))
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
    else {
        return build_dir.to_path_buf();
    };
    let stem = [".tar.gz", ".tar.bz2", ".tar.xz", ".tgz", ".tbz2", ".tbz", ".txz", ".tar", ".zip"]
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(&name);
    build_dir.join(stem)
}

/// Applies every patch in the start directory (or the patch's own sub-directory).
pub fn apply_patches(ctx: &mut BuildContext<'_>) -> Result<()> {
    for (patch, path) in ctx.patches.clone() {
        let dir = match &patch.subdir {
            Some(sub) => ctx.start_dir.join(sub),
            None => ctx.start_dir.clone(),
        };
        let level = match patch.level {
            Some(level) => level,
            None if ctx.dry_run => 1,
            None => {
                let content = fs::read_to_string(&path)?;
                guess_patch_level(&content, &dir).ok_or_else(|| {
                    EbError::Build {
                        step: "patch".to_string(),
                        msg: format!("Can't determine patch level for patch {}", path.display()),
                    }
                })?
            }
        };
        ctx.print_msg(&format!("  applying patch {}", patch.filename));
        let cmd = format!("patch -b -p{level} -i {}", path.display());
        ctx.run_cmd(&cmd, &dir)?;
    }
    Ok(())
}

/// The `-p` level at which the files touched by a unified diff exist below `dir`.
pub fn guess_patch_level(patch: &str, dir: &Path) -> Option<u32> {
    let re = Regex::new(r"(?m)^(?:\+\+\+|---)\s+(\S+)").ok()?;
    let touched: Vec<&str> = re
        .captures_iter(patch)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .filter(|p| *p != "/dev/null")
        .collect();
    for file in touched {
        let components: Vec<&str> = file.split('/').filter(|c| !c.is_empty()).collect();
        for level in 0..=MAX_PATCH_LEVEL {
            let Some(rest) = components.get(level as usize..).filter(|r| !r.is_empty()) else {
                break;
            };
            if dir.join(rest.join("/")).is_file() {
                return Some(level);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_patch_levels() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/main.c"), "int main;").unwrap();

        let git_style = "--- a/src/main.c\n+++ b/src/main.c\n@@ -1 +1 @@\n-int main;\n+int main();\n";
        assert_eq!(guess_patch_level(git_style, tmp.path()), Some(1));

        let plain = "--- src/main.c.orig\n+++ src/main.c\n";
        assert_eq!(guess_patch_level(plain, tmp.path()), Some(0));

        let unknown = "--- a/other.c\n+++ b/other.c\n";
        assert_eq!(guess_patch_level(unknown, tmp.path()), None);
    }

    #[test]
    fn start_dir_is_single_unpacked_directory() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("bzip2-1.0.8")).unwrap();
        assert_eq!(single_subdir(tmp.path()).unwrap(), tmp.path().join("bzip2-1.0.8"));

        fs::write(tmp.path().join("extra.txt"), "").unwrap();
        assert_eq!(single_subdir(tmp.path()).unwrap(), tmp.path());
    }

    #[test]
    fn dry_run_guesses_unpacked_directory() {
        let build = Path::new("/tmp/build");
        let src = PathBuf::from("/src/bzip2-1.0.8.tar.gz");
        assert_eq!(guess_unpacked_dir(build, Some(&src)), build.join("bzip2-1.0.8"));
        assert_eq!(guess_unpacked_dir(build, None), build);
    }

    #[test]
    fn locates_files_in_source_path_and_next_to_easyconfig() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_prefix(tmp.path()).unwrap();
        let store = config.source_store_dir("toy");
        fs::create_dir_all(&store).unwrap();
        fs::write(store.join("toy-0.0.tar.gz"), "").unwrap();

        let ec_dir = tmp.path().join("ecs");
        fs::create_dir_all(&ec_dir).unwrap();
        fs::write(ec_dir.join("toy-fix.patch"), "").unwrap();
        let ec = EasyConfig::from_source(
            "name = 'toy'\nversion = '0.0'\nhomepage = 'https://example.org'\n\
             description = 'toy'\ntoolchain = SYSTEM\n",
            Some(ec_dir.join("toy-0.0.eb").as_path()),
        )
        .unwrap();

        assert_eq!(
            locate_file(&config, &ec, "toy-0.0.tar.gz"),
            Some(store.join("toy-0.0.tar.gz"))
        );
        assert_eq!(
            locate_file(&config, &ec, "toy-fix.patch"),
            Some(ec_dir.join("toy-fix.patch"))
        );
        assert_eq!(locate_file(&config, &ec, "missing.tar.gz"), None);
    }
}
