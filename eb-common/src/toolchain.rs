// eb-common/src/toolchain.rs
//! Known compiler toolchains, their component families and the environment
//! they define for a build.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const SYSTEM_TOOLCHAIN_NAME: &str = "system";
pub const DUMMY_TOOLCHAIN_NAME: &str = "dummy";

/// Name/version pair as written in an easyconfig (`toolchain = {'name': .., 'version': ..}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolchainSpec {
    pub name: String,
    pub version: String,
}

impl ToolchainSpec {
    pub fn system() -> Self {
        Self {
            name: SYSTEM_TOOLCHAIN_NAME.to_string(),
            version: SYSTEM_TOOLCHAIN_NAME.to_string(),
        }
    }

    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.name == SYSTEM_TOOLCHAIN_NAME
    }

    /// Module name of the toolchain itself (`foss/2023a`); `None` for the system toolchain.
    pub fn module_name(&self) -> Option<String> {
        if self.is_system() {
            None
        } else {
            Some(format!("{}/{}", self.name, self.version))
        }
    }

    /// Infix used in version strings and file names (`-foss-2023a`), empty for system.
    pub fn version_infix(&self) -> String {
        if self.is_system() {
            String::new()
        } else {
            format!("-{}-{}", self.name, self.version)
        }
    }
}

impl fmt::Display for ToolchainSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_system() {
            f.write_str("system")
        } else {
            write!(f, "{}/{}", self.name, self.version)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompilerFamily {
    Gcc,
    IntelClassic,
    IntelOneApi,
}

impl CompilerFamily {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gcc => "GCC",
            Self::IntelClassic => "Intel",
            Self::IntelOneApi => "IntelLLVM",
        }
    }

    /// (CC, CXX, Fortran) commands.
    pub fn commands(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Gcc => ("gcc", "g++", "gfortran"),
            Self::IntelClassic => ("icc", "icpc", "ifort"),
            Self::IntelOneApi => ("icx", "icpx", "ifx"),
        }
    }

    fn pic_flag(&self) -> &'static str {
        match self {
            Self::Gcc => "-fPIC",
            Self::IntelClassic | Self::IntelOneApi => "-fpic",
        }
    }

    fn optarch_flag(&self) -> &'static str {
        match self {
            Self::Gcc => "-march=native",
            Self::IntelClassic | Self::IntelOneApi => "-xHost",
        }
    }

    fn extra_opt_flags(&self) -> &'static [&'static str] {
        match self {
            Self::Gcc => &["-ftree-vectorize", "-fno-math-errno"],
            Self::IntelClassic | Self::IntelOneApi => &["-ftz", "-fp-speculation=safe", "-fp-model source"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MpiFamily {
    OpenMpi,
    Mvapich2,
    Mpich,
    IntelMpi,
}

impl MpiFamily {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenMpi => "OpenMPI",
            Self::Mvapich2 => "MVAPICH2",
            Self::Mpich => "MPICH",
            Self::IntelMpi => "IntelMPI",
        }
    }

    /// Module providing the MPI library.
    pub fn module_name(&self) -> &'static str {
        match self {
            Self::OpenMpi => "OpenMPI",
            Self::Mvapich2 => "MVAPICH2",
            Self::Mpich => "MPICH",
            Self::IntelMpi => "impi",
        }
    }

    /// Name of the MPI library to link against (`-l<name>`).
    pub fn library_name(&self) -> &'static str {
        match self {
            Self::OpenMpi | Self::IntelMpi => "mpi",
            Self::Mvapich2 | Self::Mpich => "mpich",
        }
    }

    /// Option of the compiler wrappers that prints link information.
    pub fn link_info_option(&self) -> &'static str {
        match self {
            Self::OpenMpi => "-showme:link",
            Self::Mvapich2 | Self::Mpich => "-link_info",
            Self::IntelMpi => "-show",
        }
    }

    /// (MPICC, MPICXX, MPIF90) wrappers for the given compiler family.
    pub fn wrappers(&self, compiler: CompilerFamily) -> (&'static str, &'static str, &'static str) {
        match (self, compiler) {
            (Self::IntelMpi, CompilerFamily::IntelClassic) => ("mpiicc", "mpiicpc", "mpiifort"),
            (Self::IntelMpi, CompilerFamily::IntelOneApi) => ("mpiicx", "mpiicpx", "mpiifx"),
            _ => ("mpicc", "mpicxx", "mpif90"),
        }
    }
}

/// Static description of a toolchain known to eb.
#[derive(Debug, Clone, Serialize)]
pub struct ToolchainDefinition {
    pub name: &'static str,
    pub compiler: Option<CompilerFamily>,
    pub mpi: Option<MpiFamily>,
    /// Next toolchain down the hierarchy (`foss` → `gompi`).
    pub subtoolchain: Option<&'static str>,
    pub components: &'static [&'static str],
    pub description: &'static str,
}

const TOOLCHAINS: &[ToolchainDefinition] = &[
    ToolchainDefinition {
        name: SYSTEM_TOOLCHAIN_NAME,
        compiler: None,
        mpi: None,
        subtoolchain: None,
        components: &[],
        description: "System toolchain, only considers system compilers and libraries",
    },
    ToolchainDefinition {
        name: "GCCcore",
        compiler: Some(CompilerFamily::Gcc),
        mpi: None,
        subtoolchain: Some(SYSTEM_TOOLCHAIN_NAME),
        components: &["GCCcore"],
        description: "GCC core compilers (C, C++, Fortran) without optimized libraries",
    },
    ToolchainDefinition {
        name: "GCC",
        compiler: Some(CompilerFamily::Gcc),
        mpi: None,
        subtoolchain: Some("GCCcore"),
        components: &["GCC"],
        description: "GNU Compiler Collection with binutils",
    },
    ToolchainDefinition {
        name: "gompi",
        compiler: Some(CompilerFamily::Gcc),
        mpi: Some(MpiFamily::OpenMpi),
        subtoolchain: Some("GCC"),
        components: &["GCC", "OpenMPI"],
        description: "GCC and Open MPI",
    },
    ToolchainDefinition {
        name: "foss",
        compiler: Some(CompilerFamily::Gcc),
        mpi: Some(MpiFamily::OpenMpi),
        subtoolchain: Some("gompi"),
        components: &["GCC", "OpenMPI", "FlexiBLAS", "FFTW", "ScaLAPACK"],
        description: "GCC, Open MPI, FlexiBLAS, FFTW and ScaLAPACK",
    },
    ToolchainDefinition {
        name: "gmvapich2",
        compiler: Some(CompilerFamily::Gcc),
        mpi: Some(MpiFamily::Mvapich2),
        subtoolchain: Some("GCC"),
        components: &["GCC", "MVAPICH2"],
        description: "GCC and MVAPICH2",
    },
    ToolchainDefinition {
        name: "gmpich",
        compiler: Some(CompilerFamily::Gcc),
        mpi: Some(MpiFamily::Mpich),
        subtoolchain: Some("GCC"),
        components: &["GCC", "MPICH"],
        description: "GCC and MPICH",
    },
    ToolchainDefinition {
        name: "iccifort",
        compiler: Some(CompilerFamily::IntelClassic),
        mpi: None,
        subtoolchain: Some("GCCcore"),
        components: &["iccifort"],
        description: "Intel classic C/C++ and Fortran compilers",
    },
    ToolchainDefinition {
        name: "intel-compilers",
        compiler: Some(CompilerFamily::IntelOneApi),
        mpi: None,
        subtoolchain: Some("GCCcore"),
        components: &["intel-compilers"],
        description: "Intel oneAPI C/C++ and Fortran compilers",
    },
    ToolchainDefinition {
        name: "iimpi",
        compiler: Some(CompilerFamily::IntelOneApi),
        mpi: Some(MpiFamily::IntelMpi),
        subtoolchain: Some("intel-compilers"),
        components: &["intel-compilers", "impi"],
        description: "Intel oneAPI compilers and Intel MPI",
    },
    ToolchainDefinition {
        name: "intel",
        compiler: Some(CompilerFamily::IntelOneApi),
        mpi: Some(MpiFamily::IntelMpi),
        subtoolchain: Some("iimpi"),
        components: &["intel-compilers", "impi", "imkl"],
        description: "Intel oneAPI compilers, Intel MPI and Intel MKL",
    },
];

pub fn all_toolchains() -> &'static [ToolchainDefinition] {
    TOOLCHAINS
}

pub fn get_toolchain(name: &str) -> Option<&'static ToolchainDefinition> {
    TOOLCHAINS.iter().find(|tc| tc.name == name)
}

/// Toolchain options recognised in `toolchainopts`.
pub const TOOLCHAIN_OPTIONS: &[(&str, &str)] = &[
    ("debug", "Enable debug symbols (-g)"),
    ("noopt", "Disable compiler optimizations (-O0)"),
    ("opt", "Enable aggressive optimizations (-O3)"),
    ("optarch", "Enable architecture optimizations (default: True)"),
    ("pic", "Use position independent code"),
    ("usempi", "Use MPI compiler wrappers as default compilers"),
    ("cstd", "C standard to use, e.g. c99"),
];

/// Compiler/MPI environment variables for a build with `definition` and `options`.
pub fn toolchain_env(
    definition: &ToolchainDefinition,
    options: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    let Some(compiler) = definition.compiler else {
        return vars;
    };
    let enabled = |key: &str, default: bool| {
        options
            .get(key)
            .map(|v| v == "True" || v == "true" || v == "1")
            .unwrap_or(default)
    };

    let (cc, cxx, fc) = compiler.commands();
    let mut flags: Vec<String> = Vec::new();
    if enabled("noopt", false) {
        flags.push("-O0".to_string());
    } else if enabled("opt", false) {
        flags.push("-O3".to_string());
    } else {
        flags.push("-O2".to_string());
    }
    if enabled("debug", false) {
        flags.push("-g".to_string());
    }
    if enabled("optarch", true) {
        flags.push(compiler.optarch_flag().to_string());
    }
    flags.extend(compiler.extra_opt_flags().iter().map(|s| s.to_string()));
    if enabled("pic", false) {
        flags.push(compiler.pic_flag().to_string());
    }
    let common_flags = flags.join(" ");
    let cflags = match options.get("cstd") {
        Some(std) => format!("{common_flags} -std={std}"),
        None => common_flags.clone(),
    };

    vars.insert("CFLAGS".to_string(), cflags);
    vars.insert("CXXFLAGS".to_string(), common_flags.clone());
    vars.insert("FFLAGS".to_string(), common_flags.clone());
    vars.insert("FCFLAGS".to_string(), common_flags.clone());
    vars.insert("F90FLAGS".to_string(), common_flags);

    let (mut cc, mut cxx, mut fc) = (cc, cxx, fc);
    if let Some(mpi) = definition.mpi {
        let (mpicc, mpicxx, mpif90) = mpi.wrappers(compiler);
        vars.insert("MPICC".to_string(), mpicc.to_string());
        vars.insert("MPICXX".to_string(), mpicxx.to_string());
        vars.insert("MPIF77".to_string(), mpif90.to_string());
        vars.insert("MPIF90".to_string(), mpif90.to_string());
        vars.insert("MPIFC".to_string(), mpif90.to_string());
        vars.insert("MPI_LIBS".to_string(), format!("-l{}", mpi.library_name()));
        if enabled("usempi", false) {
            cc = mpicc;
            cxx = mpicxx;
            fc = mpif90;
        }
    }
    vars.insert("CC".to_string(), cc.to_string());
    vars.insert("CXX".to_string(), cxx.to_string());
    vars.insert("F77".to_string(), fc.to_string());
    vars.insert("F90".to_string(), fc.to_string());
    vars.insert("FC".to_string(), fc.to_string());
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_toolchain_has_no_module_or_infix() {
        let tc = ToolchainSpec::system();
        assert!(tc.is_system());
        assert_eq!(tc.module_name(), None);
        assert_eq!(tc.version_infix(), "");
        let foss = ToolchainSpec::new("foss", "2023a");
        assert_eq!(foss.module_name().as_deref(), Some("foss/2023a"));
        assert_eq!(foss.version_infix(), "-foss-2023a");
    }

    #[test]
    fn hierarchy_ends_at_system() {
        let mut name = "foss";
        let mut chain = vec![name];
        while let Some(sub) = get_toolchain(name).and_then(|d| d.subtoolchain) {
            chain.push(sub);
            name = sub;
        }
        assert_eq!(chain, vec!["foss", "gompi", "GCC", "GCCcore", "system"]);
    }

    #[test]
    fn mvapich2_links_against_mpich() {
        let tc = get_toolchain("gmvapich2").unwrap();
        let mpi = tc.mpi.unwrap();
        assert_eq!(mpi.library_name(), "mpich");
        assert_eq!(mpi.link_info_option(), "-link_info");
        let env = toolchain_env(tc, &BTreeMap::new());
        assert_eq!(env.get("MPI_LIBS").map(String::as_str), Some("-lmpich"));
        assert_eq!(env.get("CC").map(String::as_str), Some("gcc"));
    }

    #[test]
    fn toolchain_options_shape_flags() {
        let tc = get_toolchain("GCCcore").unwrap();
        let mut opts = BTreeMap::new();
        opts.insert("pic".to_string(), "True".to_string());
        opts.insert("opt".to_string(), "True".to_string());
        let env = toolchain_env(tc, &opts);
        let cflags = env.get("CFLAGS").unwrap();
        assert!(cflags.starts_with("-O3"));
        assert!(cflags.contains("-fPIC"));
        assert!(cflags.contains("-march=native"));
    }

    #[test]
    fn usempi_switches_default_compilers() {
        let tc = get_toolchain("iimpi").unwrap();
        let mut opts = BTreeMap::new();
        opts.insert("usempi".to_string(), "True".to_string());
        let env = toolchain_env(tc, &opts);
        assert_eq!(env.get("CC").map(String::as_str), Some("mpiicx"));
    }

    #[test]
    fn system_toolchain_defines_nothing() {
        let tc = get_toolchain(SYSTEM_TOOLCHAIN_NAME).unwrap();
        assert!(toolchain_env(tc, &BTreeMap::new()).is_empty());
    }
}
