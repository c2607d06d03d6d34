use std::env;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;

const MIN_VERSION: &str = "7.58.0";

fn main() {
    if let Err(err) = try_main() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), BuildError> {
    println!("cargo:rerun-if-env-changed=EASYWIRE_CURL_LIB_DIR");
    println!("cargo:rerun-if-env-changed=EASYWIRE_CURL_STATIC");

    // The loopback engine needs nothing from the system.
    if env::var_os("CARGO_FEATURE_LIBCURL").is_none() {
        return Ok(());
    }

    let lib_dir_override = env::var_os("EASYWIRE_CURL_LIB_DIR").map(PathBuf::from);
    if let Some(path) = lib_dir_override {
        if !path.exists() {
            return Err(BuildError::MissingLibDir { path });
        }
        println!("cargo:rustc-link-search=native={}", path.display());
        emit_link_libs(vec![link_name()]);
        return Ok(());
    }

    let libcurl = pkg_config::Config::new()
        .atleast_version(MIN_VERSION)
        .cargo_metadata(false)
        .probe("libcurl")
        .map_err(BuildError::PkgConfig)?;
    for lib_path in &libcurl.link_paths {
        println!("cargo:rustc-link-search=native={}", lib_path.display());
    }
    if libcurl.libs.is_empty() {
        return Err(BuildError::NoLibraries);
    }
    emit_link_libs(libcurl.libs);
    Ok(())
}

fn link_name() -> String {
    if env::var_os("EASYWIRE_CURL_STATIC").is_some() {
        "static=curl".to_string()
    } else {
        "curl".to_string()
    }
}

fn emit_link_libs(libs: Vec<String>) {
    for lib in libs {
        println!("cargo:rustc-link-lib={lib}");
    }
}

#[derive(Debug)]
enum BuildError {
    MissingLibDir { path: PathBuf },
    PkgConfig(pkg_config::Error),
    NoLibraries,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::MissingLibDir { path } => {
                write!(f, "libcurl library directory missing: {}", path.display())
            }
            BuildError::PkgConfig(_) => write!(f, "libcurl pkg-config lookup failed"),
            BuildError::NoLibraries => write!(f, "libcurl pkg-config lookup listed no libraries"),
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BuildError::PkgConfig(err) => Some(err),
            _ => None,
        }
    }
}
