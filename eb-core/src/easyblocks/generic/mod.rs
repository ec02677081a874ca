// eb-core/src/easyblocks/generic/mod.rs
pub mod binary;
pub mod bundle;
pub mod cmakemake;
pub mod configuremake;
pub mod makecp;
pub mod tarball;

pub use binary::Binary;
pub use bundle::{Bundle, Toolchain};
pub use cmakemake::CMakeMake;
pub use configuremake::ConfigureMake;
pub use makecp::MakeCp;
pub use tarball::Tarball;

/// Joins the non-empty parts of a command line with single spaces.
pub(crate) fn command_line(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_lines_skip_empty_options() {
        assert_eq!(
            command_line(&["", "./configure", "--prefix=/sw", " "]),
            "./configure --prefix=/sw"
        );
        assert_eq!(
            command_line(&["CFLAGS=-O2", "make", "-j 4", "V=1"]),
            "CFLAGS=-O2 make -j 4 V=1"
        );
    }
}
