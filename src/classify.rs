//! Keyword classifier for grip-strength measurement devices.
//!
//! Dynamometers do not advertise a dedicated service UUID, so devices are
//! recognized by their advertised name. The match is a case-insensitive
//! substring check against a configurable keyword list.

/// Keywords matched when none are supplied on the command line.
///
/// "握力" is the vendor's own naming for its grip devices.
pub const DEFAULT_KEYWORDS: &[&str] = &["握力", "grip", "force", "strength", "dynamometer"];

/// Classifies a device as a grip-strength measurement device by its
/// advertised name.
#[derive(Debug, Clone)]
pub struct Classifier {
    /// Lowercased keywords.
    keywords: Vec<String>,
}

impl Classifier {
    /// Build a classifier from user-supplied keywords.
    ///
    /// An empty slice selects [`DEFAULT_KEYWORDS`]. Keywords are lowercased
    /// once here so per-event matching only lowercases the device name.
    pub fn new(keywords: &[String]) -> Self {
        let keywords = if keywords.is_empty() {
            DEFAULT_KEYWORDS.iter().map(|k| k.to_lowercase()).collect()
        } else {
            keywords.iter().map(|k| k.to_lowercase()).collect()
        };
        Classifier { keywords }
    }

    /// Whether the advertised name marks the device as a target device.
    ///
    /// A device without a name never matches.
    pub fn is_target(&self, name: Option<&str>) -> bool {
        let Some(name) = name else {
            return false;
        };
        let name = name.to_lowercase();
        self.keywords.iter().any(|keyword| name.contains(keyword))
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&[])
    }
}
