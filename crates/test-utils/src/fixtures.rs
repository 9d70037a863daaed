//! Common capabilities fixtures for weather-loop tests.
//!
//! Trimmed-down GetCapabilities documents in the shapes real time-enabled
//! WMS servers return. Only the elements the time scanner reads are kept.

/// Layer names used by the fixture documents.
pub mod layers {
    /// Radar composite advertised as an interval (WMS 1.3.0)
    pub const RADAR: &str = "radar_base_reflectivity";

    /// Satellite band advertised as an explicit list (WMS 1.1.1)
    pub const SATELLITE: &str = "goes18_CMI_C13";

    /// Child layer inheriting its parent's TIME dimension
    pub const LIGHTNING: &str = "glm_flash_density";

    /// Static layer with no TIME dimension
    pub const BASEMAP: &str = "coastlines";
}

/// WMS 1.3.0 document: radar every 6 minutes over one hour (11 frames).
pub const WMS_130_RADAR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<WMS_Capabilities version="1.3.0" xmlns="http://www.opengis.net/wms">
  <Service><Name>WMS</Name><Title>Radar</Title></Service>
  <Capability>
    <Layer>
      <Title>Radar mosaics</Title>
      <Layer queryable="1">
        <Name>radar_base_reflectivity</Name>
        <Title>Base reflectivity</Title>
        <Style><Name>default</Name><Title>Default</Title></Style>
        <Dimension name="time" units="ISO8601" default="2026-02-18T15:00:00Z" nearestValue="0">2026-02-18T14:00:00Z/2026-02-18T15:00:00Z/PT6M</Dimension>
      </Layer>
    </Layer>
  </Capability>
</WMS_Capabilities>"#;

/// WMS 1.1.1 document: empty `Dimension` declaration plus an `Extent` list.
pub const WMS_111_SATELLITE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<WMT_MS_Capabilities version="1.1.1">
  <Capability>
    <Layer>
      <Title>GOES-18</Title>
      <Layer>
        <Name>goes18_CMI_C13</Name>
        <Title>Clean IR (10.3um)</Title>
        <Dimension name="time" units="ISO8601"/>
        <Extent name="time" default="2026-02-18T15:00:00Z">2026-02-18T14:30:00Z,2026-02-18T14:40:00Z,2026-02-18T14:50:00Z,2026-02-18T15:00:00Z</Extent>
      </Layer>
    </Layer>
  </Capability>
</WMT_MS_Capabilities>"#;

/// Parent layer carries the TIME dimension; the named child inherits it.
pub const NESTED_INHERITED: &str = r#"<WMS_Capabilities version="1.3.0">
  <Capability>
    <Layer>
      <Name>glm</Name>
      <Title>GLM</Title>
      <Dimension name="time" units="ISO8601" default="2026-02-18T15:00:00Z">2026-02-18T14:50:00Z/2026-02-18T15:00:00Z/PT5M</Dimension>
      <Layer>
        <Name>glm_flash_density</Name>
        <Title>Flash extent density</Title>
      </Layer>
    </Layer>
  </Capability>
</WMS_Capabilities>"#;

/// A layer without any time axis.
pub const NO_TIME: &str = r#"<WMS_Capabilities version="1.3.0">
  <Capability>
    <Layer>
      <Name>coastlines</Name>
      <Title>Coastlines</Title>
    </Layer>
  </Capability>
</WMS_Capabilities>"#;

/// Build a minimal WMS 1.3.0 document for one layer with the given TIME content.
pub fn capabilities_with_dimension(layer: &str, dimension: &str, default: Option<&str>) -> String {
    let default_attr = default
        .map(|d| format!(r#" default="{}""#, d))
        .unwrap_or_default();
    format!(
        r#"<WMS_Capabilities version="1.3.0"><Capability><Layer><Name>{}</Name><Dimension name="time" units="ISO8601"{}>{}</Dimension></Layer></Capability></WMS_Capabilities>"#,
        layer, default_attr, dimension
    )
}
