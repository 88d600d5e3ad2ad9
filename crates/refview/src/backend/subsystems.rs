//! Optional subsystem preferences
//!
//! WCS and FITS packages, pixel-transform accelerators and extra color maps.
//! A preference that cannot be honoured is a warning, never an error; the
//! compiled-in default stays in effect.

use std::path::PathBuf;

use crate::config::GeneralSettings;

pub const WCS_PACKAGES: &[&str] = &["astropy", "astropy_ape14", "astlib", "kapteyn", "starlink", "barebones"];
pub const FITS_PACKAGES: &[&str] = &["astropy", "fitsio"];

const DEFAULT_WCS: &str = "astropy";
const DEFAULT_FITS: &str = "astropy";

/// Pixel-transform implementation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Accelerator {
    #[default]
    Builtin,
    OpenCv,
    OpenCl,
}

impl Accelerator {
    /// Accelerators this build can switch to.
    pub fn available() -> &'static [Accelerator] {
        &[Accelerator::Builtin]
    }
}

/// Command-line overrides for subsystem preferences
#[derive(Debug, Clone, Default)]
pub struct SubsystemOverrides {
    pub wcs_pkg: Option<String>,
    pub fits_pkg: Option<String>,
    pub opencv: bool,
    pub opencl: bool,
}

/// Subsystem choices actually in effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subsystems {
    pub wcs_pkg: String,
    pub fits_pkg: String,
    pub accelerator: Accelerator,
    pub extra_colormaps: bool,
    pub icc_working_profile: Option<PathBuf>,
}

impl Default for Subsystems {
    fn default() -> Self {
        Self {
            wcs_pkg: DEFAULT_WCS.to_string(),
            fits_pkg: DEFAULT_FITS.to_string(),
            accelerator: Accelerator::Builtin,
            extra_colormaps: false,
            icc_working_profile: None,
        }
    }
}

impl Subsystems {
    /// Resolve preferences from settings and the command line.
    pub fn configure(settings: &GeneralSettings, overrides: &SubsystemOverrides) -> Self {
        let mut chosen = Self::default();

        if settings.use_matplotlib_colormaps {
            tracing::warn!("failed to load matplotlib colormaps: not available in this build");
        }

        if let Some(profile) = &settings.icc_working_profile {
            let path = PathBuf::from(profile);
            if path.is_file() {
                chosen.icc_working_profile = Some(path);
            } else {
                tracing::warn!("ICC working profile {} not found", path.display());
            }
        }

        let wcs = overrides.wcs_pkg.as_deref().unwrap_or(&settings.wcs_pkg);
        if let Some(pkg) = pick_package("WCS", wcs, WCS_PACKAGES) {
            chosen.wcs_pkg = pkg;
        }

        let fits = overrides.fits_pkg.as_deref().unwrap_or(&settings.fits_pkg);
        if let Some(pkg) = pick_package("FITS", fits, FITS_PACKAGES) {
            chosen.fits_pkg = pkg;
        }

        if settings.use_opencv || overrides.opencv {
            chosen.try_accelerator(Accelerator::OpenCv, "OpenCv");
        }
        if settings.use_opencl || overrides.opencl {
            chosen.try_accelerator(Accelerator::OpenCl, "OpenCL");
        }

        tracing::debug!(
            "Subsystems: wcs={} fits={} accelerator={:?}",
            chosen.wcs_pkg,
            chosen.fits_pkg,
            chosen.accelerator
        );
        chosen
    }

    fn try_accelerator(&mut self, wanted: Accelerator, label: &str) {
        if Accelerator::available().contains(&wanted) {
            self.accelerator = wanted;
        } else {
            tracing::warn!("failed to set {} preference: not available in this build", label);
        }
    }
}

/// `None` for "choose" or an unknown package (after a warning).
fn pick_package(kind: &str, preference: &str, known: &[&str]) -> Option<String> {
    let preference = preference.trim();
    if preference.is_empty() || preference.eq_ignore_ascii_case("choose") {
        return None;
    }
    match known.iter().find(|pkg| pkg.eq_ignore_ascii_case(preference)) {
        Some(pkg) => Some(pkg.to_string()),
        None => {
            tracing::warn!(
                "failed to set {} package preference: unknown package '{}'",
                kind,
                preference
            );
            None
        }
    }
}
