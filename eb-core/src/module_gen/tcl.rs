// eb-core/src/module_gen/tcl.rs
use std::path::Path;

use eb_common::config::ModuleSyntax;

use super::ModuleGenerator;

pub struct TclGenerator;

/// Double-quoted Tcl word with substitution disabled.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '[') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Text for a `{...}` word; unbalanced braces would end the word early.
fn brace(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '{' | '}') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl ModuleGenerator for TclGenerator {
    fn syntax(&self) -> ModuleSyntax {
        ModuleSyntax::Tcl
    }

    fn header(&self) -> String {
        "#%Module\n".to_string()
    }

    fn help(&self, text: &str) -> String {
        format!("proc ModulesHelp {{ }} {{\n    puts stderr {{{}    }}\n}}\n", brace(text))
    }

    fn whatis(&self, line: &str) -> String {
        format!("module-whatis {{{}}}\n", brace(line))
    }

    fn root(&self, install_dir: &Path) -> String {
        format!("set root {}\n", quote(&install_dir.display().to_string()))
    }

    fn conflict(&self, name: &str) -> String {
        format!("conflict {name}\n")
    }

    fn load(&self, mod_name: &str) -> String {
        format!("if {{ ![ is-loaded {mod_name} ] }} {{\n    module load {mod_name}\n}}\n")
    }

    fn prepend_path(&self, var: &str, subdir: &str) -> String {
        if subdir.is_empty() {
            format!("prepend-path\t{var}\t\t$root\n")
        } else {
            format!("prepend-path\t{var}\t\t$root/{subdir}\n")
        }
    }

    fn setenv(&self, var: &str, value: &str, subdir: Option<&str>) -> String {
        let value = match subdir {
            Some("") => "\"$root\"".to_string(),
            Some(sub) => format!("\"$root/{sub}\""),
            None => quote(value),
        };
        format!("setenv\t{var}\t\t{value}\n")
    }

    fn load_message(&self, msg: &str) -> String {
        format!(
            "if {{ [ module-info mode load ] }} {{\nputs stderr {}\n}}\n",
            quote(msg)
        )
    }

    fn footer(&self, eb_version: &str) -> String {
        format!("# Built with eb version {eb_version}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::super::sample_spec;
    use super::*;

    #[test]
    fn tcl_module_shape() {
        let mut spec = sample_spec();
        spec.load_message = Some("Loaded \"bzip2\"".into());
        let text = TclGenerator.generate(&spec);

        assert!(text.starts_with("#%Module\nproc ModulesHelp { } {\n    puts stderr {\nDescription\n"));
        assert!(text.contains("module-whatis {Description: bzip2 is a freely available"));
        assert!(text.contains("set root \"/sw/software/bzip2/1.0.8-GCCcore-12.3.0\"\n"));
        assert!(text.contains("conflict bzip2\n"));
        assert!(text.contains(
            "if { ![ is-loaded GCCcore/12.3.0 ] } {\n    module load GCCcore/12.3.0\n}\n"
        ));
        assert!(text.contains("prepend-path\tCMAKE_PREFIX_PATH\t\t$root\n"));
        assert!(text.contains("prepend-path\tPATH\t\t$root/bin\n"));
        assert!(text.contains("setenv\tEBROOTBZIP2\t\t\"$root\"\n"));
        assert!(text.contains("setenv\tEBVERSIONBZIP2\t\t\"1.0.8\"\n"));
        assert!(text.contains(
            "setenv\tEBDEVELBZIP2\t\t\"$root/easybuild/bzip2-1.0.8-GCCcore-12.3.0-easybuild-devel\"\n"
        ));
        assert!(text.contains("puts stderr \"Loaded \\\"bzip2\\\"\""));
        assert!(text.ends_with("# Built with eb version 0.1.0\n"));
    }

    #[test]
    fn special_characters_stay_inside_their_word() {
        let mut spec = sample_spec();
        spec.install_dir = "/sw/my apps/$HOME/[x]".into();
        spec.description = "uses {braces} and a stray }".into();
        let text = TclGenerator.generate(&spec);

        assert!(text.contains("set root \"/sw/my apps/\\$HOME/\\[x]\"\n"));
        assert!(text.contains("module-whatis {Description: uses \\{braces\\} and a stray \\}}\n"));
        assert!(!text.contains("stray }"));
    }
}
