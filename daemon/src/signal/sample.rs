//! Classification samples and the presence signal derived from them

use serde::{Deserialize, Serialize};

use crate::error::{InputError, CLASS_COUNT};

/// The four discrete classes reported by the webcam classifier
///
/// Serialized as the classifier's numeric id (1..=4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PresenceClass {
    /// Class 1: nobody in front of the kiosk, water off
    Empty,
    /// Class 2: person present, water off
    PersonOnly,
    /// Class 3: person present, water running
    PersonWithWater,
    /// Class 4: water running, nobody in front of the kiosk
    WaterOnly,
}

impl PresenceClass {
    /// All classes in ascending id order
    pub const ALL: [PresenceClass; CLASS_COUNT] = [
        PresenceClass::Empty,
        PresenceClass::PersonOnly,
        PresenceClass::PersonWithWater,
        PresenceClass::WaterOnly,
    ];

    /// Numeric id as produced by the classifier
    pub fn id(self) -> u8 {
        match self {
            PresenceClass::Empty => 1,
            PresenceClass::PersonOnly => 2,
            PresenceClass::PersonWithWater => 3,
            PresenceClass::WaterOnly => 4,
        }
    }

    /// Zero-based slot used for vote counting
    pub fn index(self) -> usize {
        usize::from(self.id() - 1)
    }

    /// Presence signal implied by this class
    pub fn signal(self) -> DerivedSignal {
        match self {
            PresenceClass::Empty => DerivedSignal::new(false, false),
            PresenceClass::PersonOnly => DerivedSignal::new(true, false),
            PresenceClass::PersonWithWater => DerivedSignal::new(true, true),
            PresenceClass::WaterOnly => DerivedSignal::new(false, true),
        }
    }
}

impl Default for PresenceClass {
    fn default() -> Self {
        Self::Empty
    }
}

impl std::fmt::Display for PresenceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "class-{}", self.id())
    }
}

impl From<PresenceClass> for u8 {
    fn from(class: PresenceClass) -> Self {
        class.id()
    }
}

impl TryFrom<u8> for PresenceClass {
    type Error = InputError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(PresenceClass::Empty),
            2 => Ok(PresenceClass::PersonOnly),
            3 => Ok(PresenceClass::PersonWithWater),
            4 => Ok(PresenceClass::WaterOnly),
            other => Err(InputError::ClassIdOutOfRange(other)),
        }
    }
}

/// One classifier output for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationSample {
    pub class: PresenceClass,
    /// Classifier confidence in [0, 1]
    pub confidence: f32,
}

impl ClassificationSample {
    /// Build a sample from a raw class id and confidence, validating both
    pub fn new(class_id: u8, confidence: f32) -> Result<Self, InputError> {
        let class = PresenceClass::try_from(class_id)?;
        if !confidence.is_finite() {
            return Err(InputError::NonFinite("confidence"));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(InputError::ConfidenceOutOfRange(confidence));
        }
        Ok(Self { class, confidence })
    }

    /// Build a sample from the classifier's per-class confidence vector
    ///
    /// The highest entry wins; on equal entries the lower class id wins.
    pub fn from_probabilities(probabilities: &[f32]) -> Result<Self, InputError> {
        if probabilities.len() != CLASS_COUNT {
            return Err(InputError::ConfidenceVectorLength {
                expected: CLASS_COUNT,
                actual: probabilities.len(),
            });
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(InputError::NonFinite("confidence vector"));
        }

        let mut best = 0;
        for (i, p) in probabilities.iter().enumerate().skip(1) {
            if *p > probabilities[best] {
                best = i;
            }
        }

        // best < 4 so the id always fits
        Self::new(best as u8 + 1, probabilities[best])
    }
}

/// Presence flags the flow state machine reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedSignal {
    pub person_present: bool,
    pub water_on: bool,
}

impl DerivedSignal {
    pub fn new(person_present: bool, water_on: bool) -> Self {
        Self {
            person_present,
            water_on,
        }
    }
}
