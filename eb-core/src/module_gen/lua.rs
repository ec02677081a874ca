// eb-core/src/module_gen/lua.rs
use std::path::Path;

use eb_common::config::ModuleSyntax;

use super::ModuleGenerator;

/// Lmod module files.
pub struct LuaGenerator;

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn rooted(subdir: &str) -> String {
    if subdir.is_empty() {
        "root".to_string()
    } else {
        format!("pathJoin(root, {})", quote(subdir))
    }
}

impl ModuleGenerator for LuaGenerator {
    fn syntax(&self) -> ModuleSyntax {
        ModuleSyntax::Lua
    }

    fn header(&self) -> String {
        String::new()
    }

    fn help(&self, text: &str) -> String {
        format!("help([==[{text}]==])\n")
    }

    fn whatis(&self, line: &str) -> String {
        format!("whatis([==[{line}]==])\n")
    }

    fn root(&self, install_dir: &Path) -> String {
        format!("local root = {}\n", quote(&install_dir.display().to_string()))
    }

    fn conflict(&self, name: &str) -> String {
        format!("conflict({})\n", quote(name))
    }

    fn load(&self, mod_name: &str) -> String {
        let name = quote(mod_name);
        format!("if not ( isloaded({name}) ) then\n    load({name})\nend\n")
    }

    fn prepend_path(&self, var: &str, subdir: &str) -> String {
        format!("prepend_path({}, {})\n", quote(var), rooted(subdir))
    }

    fn setenv(&self, var: &str, value: &str, subdir: Option<&str>) -> String {
        let value = match subdir {
            Some(sub) => rooted(sub),
            None => quote(value),
        };
        format!("setenv({}, {})\n", quote(var), value)
    }

    fn load_message(&self, msg: &str) -> String {
        format!("if mode() == \"load\" then\n    io.stderr:write({})\nend\n", quote(msg))
    }

    fn footer(&self, eb_version: &str) -> String {
        format!("-- Built with eb version {eb_version}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::super::sample_spec;
    use super::*;

    #[test]
    fn lua_module_shape() {
        let text = LuaGenerator.generate(&sample_spec());

        assert!(text.starts_with("help([==[\nDescription\n===========\nbzip2 is"));
        assert!(text.contains("whatis([==[Homepage: https://sourceware.org/bzip2]==])\n"));
        assert!(text.contains("local root = \"/sw/software/bzip2/1.0.8-GCCcore-12.3.0\"\n"));
        assert!(text.contains("conflict(\"bzip2\")\n"));
        assert!(text.contains(
            "if not ( isloaded(\"GCCcore/12.3.0\") ) then\n    load(\"GCCcore/12.3.0\")\nend\n"
        ));
        assert!(text.contains("prepend_path(\"CMAKE_PREFIX_PATH\", root)\n"));
        assert!(text.contains("prepend_path(\"PATH\", pathJoin(root, \"bin\"))\n"));
        assert!(text.contains("setenv(\"EBROOTBZIP2\", root)\n"));
        assert!(text.contains("setenv(\"EBVERSIONBZIP2\", \"1.0.8\")\n"));
        assert!(text.contains(
            "setenv(\"EBDEVELBZIP2\", pathJoin(root, \"easybuild/bzip2-1.0.8-GCCcore-12.3.0-easybuild-devel\"))\n"
        ));
        assert!(!text.contains("io.stderr:write"));
        assert!(text.ends_with("-- Built with eb version 0.1.0\n"));
    }
}
