use clap::Parser;
use std::path::PathBuf;

/// `spirit_viewer` - A point-cloud spirit tree placed on the floor.
///
/// Loads the tree, starts floor tracking, and waits for a click on the floor
/// to anchor it. All settings are read once at startup.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The PLY point cloud to display.
    #[arg(long, env = "SPIRIT_ASSET", default_value = "assets/spirit_tree.ply")]
    pub asset: PathBuf,

    /// Replacement WGSL for the point program. The embedded one is used if unset.
    ///
    /// The file must not read any uniform the registry does not declare.
    #[arg(long, env = "SPIRIT_SHADER")]
    pub shader: Option<PathBuf>,

    /// Require the printed floor marker before world tracking starts.
    #[arg(long)]
    pub marker: bool,

    /// Pattern ids accepted as the floor marker.
    #[arg(long = "marker-pattern", default_value = "spirit-floor")]
    pub marker_patterns: Vec<String>,

    /// Ignore the environment light estimate and render under neutral white.
    #[arg(long)]
    pub no_light_estimation: bool,

    /// Width of floor the tree is scaled to, in meters.
    #[arg(long, default_value_t = 1.2)]
    pub footprint_m: f32,

    /// Lift applied above the detected floor, in meters.
    #[arg(long, default_value_t = crate::placement::DEFAULT_FLOOR_OFFSET_M)]
    pub floor_offset_m: f32,

    /// The asset is Z-up and must be stood upright.
    #[arg(long)]
    pub z_up: bool,

    /// Fraction of points animated as fireflies.
    #[arg(long, default_value_t = 0.08, value_parser = parse_ratio)]
    pub firefly_ratio: f32,

    /// Uniform override, `NAME=VALUE`. May be repeated.
    ///
    /// Vectors and colors take comma separated components, e.g.
    /// `--set ambient_color=1,0.9,0.8`.
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_override)]
    pub overrides: Vec<(String, String)>,
}

fn parse_override(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing uniform name in '{s}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_ratio(s: &str) -> Result<f32, String> {
    let v: f32 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(format!("{v} is outside 0..=1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::try_parse_from(["spirit_viewer"]).unwrap();
        assert_eq!(cfg.marker_patterns, vec!["spirit-floor".to_string()]);
        assert_eq!(cfg.footprint_m, 1.2);
        assert_eq!(cfg.floor_offset_m, 0.02);
        assert!(!cfg.marker && !cfg.z_up && !cfg.no_light_estimation);
        assert!(cfg.overrides.is_empty());
    }

    #[test]
    fn overrides_and_patterns_repeat() {
        let cfg = Config::try_parse_from([
            "spirit_viewer",
            "--marker",
            "--marker-pattern",
            "a",
            "--marker-pattern",
            "b",
            "--set",
            "point_size=6",
            "--set",
            "ambient_color = 1,0.9,0.8",
        ])
        .unwrap();

        assert_eq!(cfg.marker_patterns, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            cfg.overrides,
            vec![
                ("point_size".to_string(), "6".to_string()),
                ("ambient_color".to_string(), "1,0.9,0.8".to_string()),
            ]
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(Config::try_parse_from(["spirit_viewer", "--set", "oops"]).is_err());
        assert!(Config::try_parse_from(["spirit_viewer", "--firefly-ratio", "1.5"]).is_err());
    }
}
