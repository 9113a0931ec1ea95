//! Built-in experiment records.
//!
//! The hydrotrend studies drive an external sediment-transport model and
//! need its results table; `rosenbrock-vector` runs the analytic driver.

use std::collections::BTreeMap;

use serde_json::json;

use crate::config::StudyConfig;

pub const PRESET_NAMES: [&str; 5] = [
    "hydrotrend-cs",
    "hydrotrend-qs",
    "hydrotrend-ri",
    "hydrotrend-pce",
    "rosenbrock-vector",
];

const TEMPERATURE: &str = "starting_mean_annual_temperature";
const PRECIPITATION: &str = "total_annual_precipitation";
const SEDIMENT_CONCENTRATION: &str = "channel_exit_water_sediment~suspended__mass_concentration";
const SEDIMENT_FLUX: &str = "channel_exit_water_sediment~suspended__mass_flow_rate";

pub fn preset(name: &str) -> Option<StudyConfig> {
    let config = match name {
        "hydrotrend-cs" => hydrotrend_cs(),
        "hydrotrend-qs" => hydrotrend_qs(),
        "hydrotrend-ri" => hydrotrend_ri(),
        "hydrotrend-pce" => hydrotrend_pce(),
        "rosenbrock-vector" => rosenbrock_vector(),
        _ => return None,
    };
    Some(config)
}

pub fn describe(name: &str) -> Option<&'static str> {
    match name {
        "hydrotrend-cs" => Some("LHS, 100 samples: max suspended-sediment concentration over 1000 yr, T/P within +/-25%"),
        "hydrotrend-qs" => Some("LHS, 100 samples: median suspended-sediment flux over 10 yr, T/P within +/-10%"),
        "hydrotrend-ri" => Some("LHS, 100 samples: days with concentration above 40 kg/m^3 and their recurrence interval"),
        "hydrotrend-pce" => Some("Gauss-Legendre quadrature, order 4, with variance-based decomposition of median flux"),
        "rosenbrock-vector" => Some("Vector sweep of the Rosenbrock function from (-0.3, 0.2) to (1.1, 1.3)"),
        _ => None,
    }
}

fn hydrotrend_base() -> StudyConfig {
    StudyConfig {
        descriptors: vec![TEMPERATURE.to_string(), PRECIPITATION.to_string()],
        interface: "NO_ID".to_string(),
        model_parameters: BTreeMap::from([("auxiliary_files".to_string(), json!("HYDRO0.HYPS"))]),
        ..StudyConfig::default()
    }
}

fn hydrotrend_cs() -> StudyConfig {
    let mut config = hydrotrend_base();
    config.method = "lhs".to_string();
    config.lower_bounds = vec![10.7, 1.19];
    config.upper_bounds = vec![17.8, 1.99];
    config.response_descriptors = vec![SEDIMENT_CONCENTRATION.to_string()];
    config.response_statistics = vec!["max".to_string()];
    config.response_levels = vec![40.0];
    config.histogram_range = Some((0.0, 50.0));
    config.run_duration = Some(1000.0);
    config.grid_x_range = Some((10.0, 20.0));
    config.grid_y_range = Some((1.0, 2.0));
    config
        .model_parameters
        .insert("bqrt_anthropogenic_factor".to_string(), json!(8.0));
    config
}

fn hydrotrend_qs() -> StudyConfig {
    let mut config = hydrotrend_base();
    config.lower_bounds = vec![12.8, 1.4];
    config.upper_bounds = vec![15.8, 1.8];
    config.response_descriptors = vec![SEDIMENT_FLUX.to_string()];
    config.response_statistics = vec!["median".to_string()];
    config.response_levels = vec![5.0];
    config.run_duration = Some(10.0);
    config
}

fn hydrotrend_ri() -> StudyConfig {
    let mut config = hydrotrend_base();
    config.lower_bounds = vec![12.8, 1.4];
    config.upper_bounds = vec![15.8, 1.8];
    config.response_descriptors = vec![SEDIMENT_CONCENTRATION.to_string()];
    config.response_statistics = vec!["exceedance_count".to_string()];
    config.response_thresholds = vec![40.0];
    config.run_duration = Some(1000.0);
    config.recurrence_histogram_range = Some((4.0, 14.0));
    config.grid_x_range = Some((12.5, 16.0));
    config.grid_y_range = Some((1.4, 1.8));
    config
}

fn hydrotrend_pce() -> StudyConfig {
    let mut config = hydrotrend_base();
    config.method = "quadrature".to_string();
    config.quadrature_order = 4;
    config.variance_based_decomp = true;
    config.lower_bounds = vec![12.8, 1.4];
    config.upper_bounds = vec![15.8, 1.8];
    config.response_descriptors = vec![SEDIMENT_FLUX.to_string()];
    config.response_statistics = vec!["median".to_string()];
    config.run_duration = Some(365.0);
    config
}

fn rosenbrock_vector() -> StudyConfig {
    StudyConfig {
        method: "vector".to_string(),
        descriptors: vec!["x1".to_string(), "x2".to_string()],
        initial_point: vec![-0.3, 0.2],
        final_point: vec![1.1, 1.3],
        response_descriptors: vec!["y1".to_string()],
        analysis_driver: Some("rosenbrock".to_string()),
        interface: "direct".to_string(),
        ..StudyConfig::default()
    }
}
