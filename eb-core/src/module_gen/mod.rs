// eb-core/src/module_gen/mod.rs
//! Environment module files, in Tcl or Lua syntax.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use eb_common::config::ModuleSyntax;

mod lua;
mod tcl;

pub use lua::LuaGenerator;
pub use tcl::TclGenerator;

/// Everything a generated module file states about one installation.
#[derive(Debug, Clone, Default)]
pub struct ModuleSpec {
    pub name: String,
    pub version: String,
    pub description: String,
    pub homepage: String,
    pub docurls: Vec<String>,
    pub site_contacts: Vec<String>,
    /// Extra `whatis` lines; description and homepage are always included.
    pub whatis: Vec<String>,
    pub install_dir: PathBuf,
    pub conflicts: Vec<String>,
    /// Modules loaded (if not loaded yet) when this one is.
    pub loads: Vec<String>,
    /// Sub-directories of the installation prepended per variable; `""` is the root.
    pub prepend_paths: BTreeMap<String, Vec<String>>,
    /// Values below the installation directory are written relative to its root.
    pub set_env: Vec<(String, String)>,
    pub load_message: Option<String>,
    pub eb_version: String,
}

impl ModuleSpec {
    /// Path of `value` relative to the installation root, if it lies below it.
    fn root_relative(&self, value: &str) -> Option<String> {
        let value = Path::new(value);
        let rel = value.strip_prefix(&self.install_dir).ok()?;
        Some(rel.display().to_string())
    }

    fn help_text(&self) -> String {
        let mut text = format!(
            "\nDescription\n===========\n{}\n\n\nMore information\n================\n - Homepage: {}\n",
            self.description, self.homepage
        );
        if !self.docurls.is_empty() {
            text.push_str(" - Documentation:\n");
            for url in &self.docurls {
                text.push_str(&format!("    - {url}\n"));
            }
        }
        if !self.site_contacts.is_empty() {
            text.push_str(&format!(" - Site contacts: {}\n", self.site_contacts.join(", ")));
        }
        text
    }

    fn whatis_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Description: {}", self.description),
            format!("Homepage: {}", self.homepage),
            format!("URL: {}", self.homepage),
        ];
        lines.extend(self.whatis.iter().cloned());
        lines
    }
}

/// One module file syntax. `generate` assembles a complete file from the statement
/// builders.
pub trait ModuleGenerator {
    fn syntax(&self) -> ModuleSyntax;

    fn header(&self) -> String;

    fn help(&self, text: &str) -> String;

    fn whatis(&self, line: &str) -> String;

    /// Binds the installation directory to `root`.
    fn root(&self, install_dir: &Path) -> String;

    fn conflict(&self, name: &str) -> String;

    fn load(&self, mod_name: &str) -> String;

    /// Prepends `root/<subdir>` to `var`.
    fn prepend_path(&self, var: &str, subdir: &str) -> String;

    /// `root/<subdir>`, or the literal `value` when `subdir` is `None`.
    fn setenv(&self, var: &str, value: &str, subdir: Option<&str>) -> String;

    fn load_message(&self, msg: &str) -> String;

    fn footer(&self, eb_version: &str) -> String;

    fn generate(&self, spec: &ModuleSpec) -> String {
        let mut out = self.header();
        out.push_str(&self.help(&spec.help_text()));
        out.push('\n');
        for line in spec.whatis_lines() {
            out.push_str(&self.whatis(&line));
        }
        out.push('\n');
        out.push_str(&self.root(&spec.install_dir));
        out.push('\n');
        for name in &spec.conflicts {
            out.push_str(&self.conflict(name));
        }
        if !spec.conflicts.is_empty() {
            out.push('\n');
        }
        for mod_name in &spec.loads {
            out.push_str(&self.load(mod_name));
            out.push('\n');
        }
        for (var, subdirs) in &spec.prepend_paths {
            for subdir in subdirs {
                out.push_str(&self.prepend_path(var, subdir));
            }
        }
        out.push('\n');
        for (var, value) in &spec.set_env {
            let subdir = spec.root_relative(value);
            out.push_str(&self.setenv(var, value, subdir.as_deref()));
        }
        if let Some(msg) = spec.load_message.as_deref().filter(|m| !m.is_empty()) {
            out.push('\n');
            out.push_str(&self.load_message(msg));
        }
        out.push('\n');
        out.push_str(&self.footer(&spec.eb_version));
        out
    }
}

pub fn module_generator(syntax: ModuleSyntax) -> Box<dyn ModuleGenerator> {
    match syntax {
        ModuleSyntax::Lua => Box::new(LuaGenerator),
        ModuleSyntax::Tcl => Box::new(TclGenerator),
    }
}

#[cfg(test)]
pub(crate) fn sample_spec() -> ModuleSpec {
    let mut prepend_paths = BTreeMap::new();
    prepend_paths.insert("PATH".to_string(), vec!["bin".to_string()]);
    prepend_paths.insert("CMAKE_PREFIX_PATH".to_string(), vec![String::new()]);
    ModuleSpec {
        name: "bzip2".into(),
        version: "1.0.8".into(),
        description: "bzip2 is a freely available, patent free, high-quality data compressor.".into(),
        homepage: "https://sourceware.org/bzip2".into(),
        install_dir: PathBuf::from("/sw/software/bzip2/1.0.8-GCCcore-12.3.0"),
        conflicts: vec!["bzip2".into()],
        loads: vec!["GCCcore/12.3.0".into()],
        prepend_paths,
        set_env: vec![
            ("EBROOTBZIP2".into(), "/sw/software/bzip2/1.0.8-GCCcore-12.3.0".into()),
            ("EBVERSIONBZIP2".into(), "1.0.8".into()),
            (
                "EBDEVELBZIP2".into(),
                "/sw/software/bzip2/1.0.8-GCCcore-12.3.0/easybuild/bzip2-1.0.8-GCCcore-12.3.0-easybuild-devel".into(),
            ),
        ],
        eb_version: "0.1.0".into(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_lists_homepage_and_docs() {
        let mut spec = sample_spec();
        spec.docurls = vec!["https://sourceware.org/bzip2/docs.html".into()];
        let help = spec.help_text();
        assert!(help.contains("Description\n===========\nbzip2 is"));
        assert!(help.contains(" - Homepage: https://sourceware.org/bzip2\n"));
        assert!(help.contains("    - https://sourceware.org/bzip2/docs.html"));
    }

    #[test]
    fn values_below_install_dir_are_root_relative() {
        let spec = sample_spec();
        assert_eq!(
            spec.root_relative("/sw/software/bzip2/1.0.8-GCCcore-12.3.0").as_deref(),
            Some("")
        );
        assert_eq!(
            spec.root_relative("/sw/software/bzip2/1.0.8-GCCcore-12.3.0/share/doc").as_deref(),
            Some("share/doc")
        );
        assert_eq!(spec.root_relative("1.0.8"), None);
    }

    #[test]
    fn generator_matches_syntax() {
        assert_eq!(module_generator(ModuleSyntax::Lua).syntax(), ModuleSyntax::Lua);
        assert_eq!(module_generator(ModuleSyntax::Tcl).syntax(), ModuleSyntax::Tcl);
    }
}
