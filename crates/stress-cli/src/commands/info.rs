//! Device information

use crate::output::{Formattable, OutputFormat, OutputFormatter};
use anyhow::Result;
use serde::Serialize;
use stress_gpu::{DeviceInfo, Stressor};

#[derive(Debug, Serialize)]
pub struct DeviceView {
    pub platform: String,
    #[serde(flatten)]
    pub info: DeviceInfo,
}

impl Formattable for DeviceView {
    fn table_headers() -> Vec<String> {
        let mut headers = vec!["Platform".to_string()];
        headers.extend(DeviceInfo::table_headers());
        headers
    }

    fn table_row(&self) -> Vec<String> {
        let mut row = vec![self.platform.clone()];
        row.extend(self.info.table_row());
        row
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        Self::table_headers().into_iter().zip(self.table_row()).collect()
    }
}

/// Show the device the stressor is bound to
pub fn show_info(stressor: &Stressor, output_format: OutputFormat) -> Result<DeviceView> {
    let view = DeviceView {
        platform: stressor.platform().to_string(),
        info: stressor.device_info().clone(),
    };
    OutputFormatter::new(output_format).print_item(&view)?;
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stress_gpu::mock::MockDevice;
    use stress_gpu::{DisabledProbe, KernelConfig};

    #[test]
    fn test_show_info_reports_platform() {
        let stressor = Stressor::with_parts(
            MockDevice::gpu("Bench GPU", 12).into_resolved(),
            Arc::new(DisabledProbe),
            KernelConfig::default(),
        );
        let view = show_info(&stressor, OutputFormat::Text).unwrap();
        assert_eq!(view.platform, "mock");
        assert_eq!(view.info.parallel_unit_count, 12);
        assert_eq!(view.key_value_pairs()[0], ("Platform".to_string(), "mock".to_string()));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["name"], "Bench GPU");
        assert_eq!(json["platform"], "mock");
    }
}
