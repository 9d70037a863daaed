//! Overlay composer: product catalog, layer selection and descriptor assembly.
//!
//! The catalog is loaded from YAML (see `config/products.yaml`):
//!
//! ```yaml
//! products:
//!   - id: mrms_reflectivity
//!     kind: radar
//!     title: MRMS Base Reflectivity
//!     url: https://example.com/wms
//!     layer: radar_base_reflectivity
//!     attribution: NOAA/NSSL
//!   - id: gfs
//!     kind: forecast
//!     title: GFS
//!     url: https://example.com/wms
//!     layer: gfs_{param}
//!     parameters:
//!       TMP: { ELEVATION: "2 m above ground" }
//!     forecast:
//!       layer_template: gfs_{param}_f{hour}
//!       hours: [0, 3, 6, 9]
//! ```
//!
//! Composition is pure: no I/O, no caching. It is re-run whenever the
//! selection or the current frame changes.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::coordinator::{FrameLookup, TimelineRequest, TimelineSource};
use crate::frame::{FrameMode, OverlayDescriptor};

/// Overlay id used for the radar slot.
pub const RADAR_OVERLAY: &str = "radar";
/// Overlay id used for the satellite slot.
pub const SATELLITE_OVERLAY: &str = "satellite";
/// Overlay id used for the forecast-model slot.
pub const FORECAST_OVERLAY: &str = "forecast";

/// Category of a catalog product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Radar,
    Satellite,
    Forecast,
}

impl ProductKind {
    /// Frame interpretation for overlays built from this kind.
    pub fn frame_mode(self) -> FrameMode {
        match self {
            Self::Forecast => FrameMode::Forecast,
            Self::Radar | Self::Satellite => FrameMode::Time,
        }
    }
}

/// Forecast steps published as separate layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastSteps {
    /// Layer name with a `{hour}` placeholder, e.g. `gfs_TMP_f{hour}`
    pub layer_template: String,
    /// Forecast hours, in display order
    pub hours: Vec<u32>,
}

fn default_format() -> String {
    "image/png".to_string()
}

fn default_transparent() -> bool {
    true
}

fn default_opacity() -> f32 {
    0.7
}

/// One selectable imagery product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub kind: ProductKind,
    pub title: String,
    /// Tile endpoint
    pub url: String,
    /// Base layer name, may contain `{param}`
    pub layer: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_transparent")]
    pub transparent: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub attribution: String,
    /// Query parameters sent with every tile request
    #[serde(default)]
    pub extra_params: BTreeMap<String, String>,
    /// Capabilities endpoint, defaults to `url`
    #[serde(default)]
    pub capabilities_url: Option<String>,
    /// Selectable parameters and the extra query parameters each one needs
    #[serde(default)]
    pub parameters: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub forecast: Option<ForecastSteps>,
}

impl Product {
    /// Parameter to use: the requested one if known, else the first listed.
    fn parameter<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        match requested {
            Some(p) if self.parameters.is_empty() || self.parameters.contains_key(p) => Some(p),
            _ => self.parameters.keys().next().map(String::as_str),
        }
    }

    /// Base layer name with `{param}` substituted.
    pub fn layer_name(&self, parameter: Option<&str>) -> String {
        substitute(&self.layer, self.parameter(parameter), None)
    }

    /// Static query parameters, including the parameter-specific ones.
    pub fn query_params(&self, parameter: Option<&str>) -> BTreeMap<String, String> {
        let mut params = self.extra_params.clone();
        if let Some(extra) = self.parameter(parameter).and_then(|p| self.parameters.get(p)) {
            params.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        params
    }

    /// Per-hour layer names of a forecast product, in display order.
    pub fn forecast_layers(&self, parameter: Option<&str>) -> Vec<String> {
        let Some(steps) = &self.forecast else {
            return Vec::new();
        };
        let parameter = self.parameter(parameter);
        steps
            .hours
            .iter()
            .map(|hour| substitute(&steps.layer_template, parameter, Some(*hour)))
            .collect()
    }

    pub fn capabilities_url(&self) -> &str {
        self.capabilities_url.as_deref().unwrap_or(&self.url)
    }

    /// Where this product's frame keys come from.
    pub fn timeline_source(&self, parameter: Option<&str>) -> TimelineSource {
        match self.kind.frame_mode() {
            FrameMode::Forecast => TimelineSource::Forecast {
                keys: self.forecast_layers(parameter),
            },
            FrameMode::Time => TimelineSource::Capabilities {
                layer: self.layer_name(parameter),
                url: self.capabilities_url().to_string(),
            },
        }
    }
}

fn substitute(template: &str, parameter: Option<&str>, hour: Option<u32>) -> String {
    let mut out = template.to_string();
    if let Some(parameter) = parameter {
        out = out.replace("{param}", parameter);
    }
    if let Some(hour) = hour {
        out = out.replace("{hour}", &format!("{:03}", hour));
    }
    out
}

/// All selectable products.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductCatalog {
    pub products: Vec<Product>,
}

impl ProductCatalog {
    /// Load and validate a catalog from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading product catalog {}", path.display()))?;
        let catalog = Self::from_yaml_str(&content)
            .with_context(|| format!("loading product catalog {}", path.display()))?;
        info!(path = %path.display(), products = catalog.products.len(), "Loaded product catalog");
        Ok(catalog)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let catalog: ProductCatalog = serde_yaml::from_str(content).context("parsing product catalog")?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Reject duplicate ids, out-of-range opacity and incomplete forecast products.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for product in &self.products {
            if !seen.insert(product.id.as_str()) {
                anyhow::bail!("duplicate product id '{}'", product.id);
            }
            if !(0.0..=1.0).contains(&product.opacity) {
                anyhow::bail!("product '{}': opacity {} outside 0.0..=1.0", product.id, product.opacity);
            }
            if product.url.is_empty() || product.layer.is_empty() {
                anyhow::bail!("product '{}': url and layer are required", product.id);
            }
            match (product.kind, &product.forecast) {
                (ProductKind::Forecast, None) => {
                    anyhow::bail!("forecast product '{}' has no forecast steps", product.id)
                }
                (ProductKind::Forecast, Some(steps)) if !steps.layer_template.contains("{hour}") => {
                    anyhow::bail!("product '{}': layer_template must contain {{hour}}", product.id)
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// One overlay slot of the selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerToggle {
    pub enabled: bool,
    /// Catalog product id
    pub product: String,
    /// Parameter of a multi-parameter product, e.g. `TMP`
    pub parameter: Option<String>,
}

impl LayerToggle {
    pub fn on(product: impl Into<String>) -> Self {
        Self {
            enabled: true,
            product: product.into(),
            parameter: None,
        }
    }

    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }
}

/// Active layer toggles and product choices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerSelection {
    pub radar: LayerToggle,
    pub satellite: LayerToggle,
    pub forecast: LayerToggle,
}

impl LayerSelection {
    /// Enabled slots with their overlay ids, in primary-preference order.
    pub fn active(&self) -> impl Iterator<Item = (&'static str, &LayerToggle)> {
        [
            (RADAR_OVERLAY, &self.radar),
            (SATELLITE_OVERLAY, &self.satellite),
            (FORECAST_OVERLAY, &self.forecast),
        ]
        .into_iter()
        .filter(|(_, toggle)| toggle.enabled)
    }
}

fn active_products<'a>(
    selection: &'a LayerSelection,
    catalog: &'a ProductCatalog,
) -> impl Iterator<Item = (&'static str, &'a LayerToggle, &'a Product)> {
    selection.active().filter_map(move |(id, toggle)| match catalog.get(&toggle.product) {
        Some(product) => Some((id, toggle, product)),
        None => {
            warn!(overlay = id, product = %toggle.product, "Unknown product, overlay skipped");
            None
        }
    })
}

/// Timeline requests for every enabled overlay.
pub fn timeline_requests(selection: &LayerSelection, catalog: &ProductCatalog) -> Vec<TimelineRequest> {
    active_products(selection, catalog)
        .map(|(id, toggle, product)| TimelineRequest {
            overlay_id: id.to_string(),
            source: product.timeline_source(toggle.parameter.as_deref()),
        })
        .collect()
}

/// Overlay descriptors for every enabled overlay.
///
/// Overlays whose timeline is not resolved yet get an empty frame list and
/// no current frame; the precache manager shows their placeholder only.
pub fn compose_overlays(
    selection: &LayerSelection,
    catalog: &ProductCatalog,
    frames: &impl FrameLookup,
) -> Vec<OverlayDescriptor> {
    active_products(selection, catalog)
        .map(|(id, toggle, product)| {
            let parameter = toggle.parameter.as_deref();
            OverlayDescriptor {
                id: id.to_string(),
                url: product.url.clone(),
                layers: product.layer_name(parameter),
                opacity: product.opacity,
                format: product.format.clone(),
                transparent: product.transparent,
                current_frame: frames.current_key(id).cloned(),
                frames: frames.keys(id).to_vec(),
                mode: product.kind.frame_mode(),
                extra_params: product.query_params(parameter),
                attribution: product.attribution.clone(),
            }
        })
        .collect()
}
