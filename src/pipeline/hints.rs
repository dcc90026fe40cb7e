//! Filename-derived hints and identity backfill.
//!
//! Datasheet filenames usually carry the part number and often the sensor
//! family (`TEMT6000_datasheet.pdf`, `bmp280-pressure.pdf`). Both are
//! computed without a model call: they are embedded in every prompt as
//! supplementary context, and used to backfill `model` / `sensor_type` when
//! no page yielded them.

use crate::record::MergedRecord;
use tracing::info;

/// Ordered keyword table: first pattern contained in the lowercased filename
/// wins. Order is significant ("temt" must not shadow "temp", "ir" is last
/// because it matches almost anything).
pub const SENSOR_TYPE_PATTERNS: [(&str, &str); 23] = [
    ("temp", "Temperature Sensor"),
    ("therm", "Temperature Sensor"),
    ("pressure", "Pressure Sensor"),
    ("force", "Force Sensor"),
    ("accel", "Accelerometer"),
    ("gyro", "Gyroscope"),
    ("light", "Light Sensor"),
    ("photo", "Light Sensor"),
    ("humidity", "Humidity Sensor"),
    ("motor", "Motor"),
    ("servo", "Servo Motor"),
    ("temt", "Light Sensor"),
    ("hall", "Hall Effect Sensor"),
    ("current", "Current Sensor"),
    ("voltage", "Voltage Sensor"),
    ("torque", "Torque Sensor"),
    ("mag", "Magnetic Sensor"),
    ("flow", "Flow Sensor"),
    ("level", "Level Sensor"),
    ("gps", "GPS Sensor"),
    ("proximity", "Proximity Sensor"),
    ("ultrasonic", "Ultrasonic Sensor"),
    ("ir", "Infrared Sensor"),
];

/// Hints derived once per run from the uploaded filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameHints {
    pub filename: String,
    pub model_hint: String,
    pub sensor_type_hint: Option<&'static str>,
}

impl FilenameHints {
    pub fn from_filename(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            model_hint: model_hint(filename),
            sensor_type_hint: sensor_type_hint(filename),
        }
    }

    /// Backfill missing identity fields on a merged record.
    ///
    /// A missing `model` becomes the filename stem with underscores turned
    /// into spaces, or `Unknown_<filename>` when that is empty. A missing
    /// `sensor_type` becomes the keyword hint, if any.
    pub fn resolve_identity(&self, record: &mut MergedRecord) {
        if record.model.is_none() {
            let derived = file_stem(&self.filename).replace('_', " ").trim().to_string();
            let model = if derived.is_empty() {
                format!("Unknown_{}", self.filename)
            } else {
                derived
            };
            info!("Using filename-derived model: {}", model);
            record.model = Some(model);
        }

        if record.sensor_type.is_none() {
            if let Some(hint) = self.sensor_type_hint {
                info!("Using filename-derived sensor type: {}", hint);
                record.sensor_type = Some(hint.to_string());
            }
        }
    }
}

/// Guess the sensor family from the filename via [`SENSOR_TYPE_PATTERNS`].
pub fn sensor_type_hint(filename: &str) -> Option<&'static str> {
    let lower = filename.to_lowercase();
    SENSOR_TYPE_PATTERNS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, sensor_type)| *sensor_type)
}

/// The filename stem with `_` and `-` separators turned into spaces.
pub fn model_hint(filename: &str) -> String {
    file_stem(filename)
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Final path component without its last extension.
///
/// Unlike `Path::file_stem`, a name that is only an extension (`.pdf`)
/// yields an empty stem.
fn file_stem(filename: &str) -> &str {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);
    match base.rfind('.') {
        Some(idx) => &base[..idx],
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_table_first_match_wins() {
        assert_eq!(sensor_type_hint("TEMT6000_datasheet.pdf"), Some("Light Sensor"));
        assert_eq!(sensor_type_hint("LM35_temp.pdf"), Some("Temperature Sensor"));
        assert_eq!(sensor_type_hint("A3144_HALL.pdf"), Some("Hall Effect Sensor"));
        // "temperature" matches "temp" before "ir" could
        assert_eq!(sensor_type_hint("ir_temperature.pdf"), Some("Temperature Sensor"));
        assert_eq!(sensor_type_hint("MLX90614_ir.pdf"), Some("Infrared Sensor"));
        assert_eq!(sensor_type_hint("X1.pdf"), None);
    }

    #[test]
    fn model_hint_replaces_separators() {
        assert_eq!(model_hint("TEMT6000_datasheet.pdf"), "TEMT6000 datasheet");
        assert_eq!(model_hint("bmp-280__rev_b.PDF"), "bmp 280 rev b");
        assert_eq!(model_hint("/uploads/X1.pdf"), "X1");
    }

    #[test]
    fn file_stem_edge_cases() {
        assert_eq!(file_stem("a.b.pdf"), "a.b");
        assert_eq!(file_stem(".pdf"), "");
        assert_eq!(file_stem("noext"), "noext");
        assert_eq!(file_stem("dir\\win.pdf"), "win");
    }

    #[test]
    fn resolve_identity_backfills_both_fields() {
        let hints = FilenameHints::from_filename("TEMT6000_datasheet.pdf");
        let mut record = MergedRecord::default();
        hints.resolve_identity(&mut record);
        assert_eq!(record.model.as_deref(), Some("TEMT6000 datasheet"));
        assert_eq!(record.sensor_type.as_deref(), Some("Light Sensor"));
    }

    #[test]
    fn resolve_identity_keeps_extracted_values() {
        let hints = FilenameHints::from_filename("TEMT6000_datasheet.pdf");
        let mut record = MergedRecord {
            model: Some("TEMT6000X01".into()),
            sensor_type: Some("Ambient Light Sensor".into()),
            ..Default::default()
        };
        hints.resolve_identity(&mut record);
        assert_eq!(record.model.as_deref(), Some("TEMT6000X01"));
        assert_eq!(record.sensor_type.as_deref(), Some("Ambient Light Sensor"));
    }

    #[test]
    fn resolve_identity_placeholder_for_empty_stem() {
        let hints = FilenameHints::from_filename("_.pdf");
        let mut record = MergedRecord::default();
        hints.resolve_identity(&mut record);
        assert_eq!(record.model.as_deref(), Some("Unknown__.pdf"));
        assert_eq!(record.sensor_type, None);
    }

    #[test]
    fn resolve_identity_is_deterministic() {
        let hints = FilenameHints::from_filename("bmp280_pressure.pdf");
        let mut a = MergedRecord::default();
        let mut b = MergedRecord::default();
        hints.resolve_identity(&mut a);
        hints.resolve_identity(&mut b);
        assert_eq!(a, b);
    }
}
