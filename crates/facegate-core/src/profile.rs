//! Facial profiles produced by the vision model, and the defensive parser
//! that turns its free-form answer into one.
//!
//! Parsing runs three passes: strict JSON, JSON after a repair pass, then
//! keyword extraction against the fixed vocabularies below. Any attribute a
//! pass cannot establish stays [`Attr::Unknown`]; defaults are resolved only
//! through [`Feature::default_term`] and [`Measure::default_value`].

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// A profile attribute the model either established or did not.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attr<T> {
    Known(T),
    Unknown,
}

impl<T> Attr<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Attr::Known(_))
    }

    pub fn known(self) -> Option<T> {
        match self {
            Attr::Known(v) => Some(v),
            Attr::Unknown => None,
        }
    }

    pub fn or(self, default: T) -> T {
        self.known().unwrap_or(default)
    }
}

impl<T> From<Option<T>> for Attr<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Attr::Unknown, Attr::Known)
    }
}

/// One vocabulary entry: canonical name, embedding scalar, accepted synonyms.
#[derive(Debug)]
pub struct Term {
    pub name: &'static str,
    pub value: f32,
    pub aliases: &'static [&'static str],
}

const fn term(name: &'static str, value: f32, aliases: &'static [&'static str]) -> Term {
    Term { name, value, aliases }
}

const FACE_SHAPES: &[Term] = &[
    term("round", 0.0, &[]),
    term("oval", 0.2, &["oblong"]),
    term("square", 0.4, &[]),
    term("rectangular", 0.6, &["rectangle"]),
    term("triangular", 0.8, &["triangle", "heart"]),
    term("diamond", 1.0, &[]),
];
const EYE_SHAPES: &[Term] = &[
    term("almond", 0.0, &[]),
    term("round", 0.2, &[]),
    term("hooded", 0.4, &[]),
    term("monolid", 0.6, &[]),
    term("upturned", 0.8, &[]),
    term("downturned", 1.0, &[]),
];
const SIZES: &[Term] = &[
    term("small", 0.0, &[]),
    term("medium", 0.5, &["average", "moderate"]),
    term("large", 1.0, &["big"]),
];
const SPACINGS: &[Term] = &[
    term("close", 0.0, &["close-set", "narrow"]),
    term("average", 0.5, &["normal", "medium"]),
    term("wide", 1.0, &["wide-set"]),
];
const NOSE_SHAPES: &[Term] = &[
    term("straight", 0.0, &[]),
    term("aquiline", 0.2, &["roman"]),
    term("button", 0.4, &[]),
    term("snub", 0.6, &["upturned"]),
    term("hooked", 0.8, &[]),
    term("flat", 1.0, &[]),
];
const WIDTHS: &[Term] = &[
    term("narrow", 0.0, &["thin"]),
    term("medium", 0.5, &["average", "moderate"]),
    term("wide", 1.0, &["broad"]),
];
const FULLNESS: &[Term] = &[
    term("thin", 0.0, &[]),
    term("medium", 0.5, &["average", "moderate"]),
    term("full", 1.0, &["thick", "plump"]),
];
const CHIN_SHAPES: &[Term] = &[
    term("pointed", 0.0, &["narrow"]),
    term("rounded", 0.33, &["round"]),
    term("square", 0.66, &["strong"]),
    term("cleft", 1.0, &[]),
];
const EYEBROW_SHAPES: &[Term] = &[
    term("straight", 0.0, &["flat"]),
    term("curved", 0.33, &["rounded"]),
    term("arched", 0.66, &[]),
    term("angled", 1.0, &["angular"]),
];
const THICKNESS: &[Term] = &[
    term("thin", 0.0, &[]),
    term("medium", 0.5, &["average", "moderate"]),
    term("thick", 1.0, &["bushy"]),
];
const PROMINENCE: &[Term] = &[
    term("low", 0.0, &["flat"]),
    term("medium", 0.5, &["average", "moderate"]),
    term("high", 1.0, &["prominent"]),
];
const HEIGHTS: &[Term] = &[
    term("low", 0.0, &["short"]),
    term("medium", 0.5, &["average", "moderate"]),
    term("high", 1.0, &["tall"]),
];
const GENDERS: &[Term] = &[
    term("female", 0.0, &["woman"]),
    term("indeterminate", 0.5, &["unknown", "unclear", "androgynous"]),
    term("male", 1.0, &["man"]),
];
const ETHNICITIES: &[Term] = &[
    term("east asian", 0.0, &[]),
    term("southeast asian", 0.125, &[]),
    term("south asian", 0.25, &["indian"]),
    term("middle eastern", 0.375, &["arab"]),
    term("unspecified", 0.5, &["unknown", "mixed"]),
    term("white", 0.625, &["caucasian", "european"]),
    term("hispanic", 0.75, &["latino", "latina", "latinx"]),
    term("black", 0.875, &["african"]),
    term("indigenous", 1.0, &["native"]),
];

/// Categorical profile attributes, in embedding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    FaceShape,
    EyeShape,
    EyeSize,
    EyeSpacing,
    NoseShape,
    NoseWidth,
    LipFullness,
    MouthWidth,
    ChinShape,
    EyebrowShape,
    EyebrowThickness,
    Cheekbones,
    ForeheadHeight,
    Gender,
    Ethnicity,
}

impl Feature {
    pub const ALL: [Feature; 15] = [
        Feature::FaceShape,
        Feature::EyeShape,
        Feature::EyeSize,
        Feature::EyeSpacing,
        Feature::NoseShape,
        Feature::NoseWidth,
        Feature::LipFullness,
        Feature::MouthWidth,
        Feature::ChinShape,
        Feature::EyebrowShape,
        Feature::EyebrowThickness,
        Feature::Cheekbones,
        Feature::ForeheadHeight,
        Feature::Gender,
        Feature::Ethnicity,
    ];

    /// Key used in the prompt's JSON schema.
    pub fn key(self) -> &'static str {
        match self {
            Feature::FaceShape => "face_shape",
            Feature::EyeShape => "eye_shape",
            Feature::EyeSize => "eye_size",
            Feature::EyeSpacing => "eye_spacing",
            Feature::NoseShape => "nose_shape",
            Feature::NoseWidth => "nose_width",
            Feature::LipFullness => "lip_fullness",
            Feature::MouthWidth => "mouth_width",
            Feature::ChinShape => "chin_shape",
            Feature::EyebrowShape => "eyebrow_shape",
            Feature::EyebrowThickness => "eyebrow_thickness",
            Feature::Cheekbones => "cheekbones",
            Feature::ForeheadHeight => "forehead_height",
            Feature::Gender => "apparent_gender",
            Feature::Ethnicity => "apparent_ethnicity",
        }
    }

    /// Nested locations models commonly use instead of the flat key.
    fn nested_paths(self) -> &'static [&'static str] {
        match self {
            Feature::FaceShape => &["/face/shape"],
            Feature::EyeShape => &["/eyes/shape"],
            Feature::EyeSize => &["/eyes/size"],
            Feature::EyeSpacing => &["/eyes/spacing"],
            Feature::NoseShape => &["/nose/shape"],
            Feature::NoseWidth => &["/nose/width"],
            Feature::LipFullness => &["/mouth/lips", "/lips/fullness"],
            Feature::MouthWidth => &["/mouth/width"],
            Feature::ChinShape => &["/chin/shape", "/chin"],
            Feature::EyebrowShape => &["/eyebrows/shape"],
            Feature::EyebrowThickness => &["/eyebrows/thickness"],
            Feature::Cheekbones => &["/cheeks/cheekbones", "/cheeks"],
            Feature::ForeheadHeight => &["/forehead/height", "/forehead"],
            Feature::Gender => &["/gender", "/demographics/gender"],
            Feature::Ethnicity => &["/ethnicity", "/demographics/ethnicity"],
        }
    }

    /// Words that scope a free-text clause to this feature; empty means any clause.
    fn labels(self) -> &'static [&'static str] {
        match self {
            Feature::FaceShape => &["face"],
            Feature::EyeShape | Feature::EyeSize | Feature::EyeSpacing => &["eye", "eyes"],
            Feature::NoseShape | Feature::NoseWidth => &["nose"],
            Feature::LipFullness => &["lip", "lips"],
            Feature::MouthWidth => &["mouth"],
            Feature::ChinShape => &["chin"],
            Feature::EyebrowShape | Feature::EyebrowThickness => &["eyebrow", "eyebrows", "brow", "brows"],
            Feature::Cheekbones => &["cheek", "cheeks", "cheekbone", "cheekbones"],
            Feature::ForeheadHeight => &["forehead"],
            Feature::Gender | Feature::Ethnicity => &[],
        }
    }

    pub fn vocabulary(self) -> &'static [Term] {
        match self {
            Feature::FaceShape => FACE_SHAPES,
            Feature::EyeShape => EYE_SHAPES,
            Feature::EyeSize => SIZES,
            Feature::EyeSpacing => SPACINGS,
            Feature::NoseShape => NOSE_SHAPES,
            Feature::NoseWidth => WIDTHS,
            Feature::LipFullness => FULLNESS,
            Feature::MouthWidth => WIDTHS,
            Feature::ChinShape => CHIN_SHAPES,
            Feature::EyebrowShape => EYEBROW_SHAPES,
            Feature::EyebrowThickness => THICKNESS,
            Feature::Cheekbones => PROMINENCE,
            Feature::ForeheadHeight => HEIGHTS,
            Feature::Gender => GENDERS,
            Feature::Ethnicity => ETHNICITIES,
        }
    }

    /// Value assumed when the model did not establish this feature.
    pub fn default_term(self) -> &'static str {
        match self {
            Feature::FaceShape => "oval",
            Feature::EyeShape => "almond",
            Feature::EyeSpacing => "average",
            Feature::NoseShape => "straight",
            Feature::ChinShape => "rounded",
            Feature::EyebrowShape => "arched",
            Feature::Gender => "indeterminate",
            Feature::Ethnicity => "unspecified",
            Feature::EyeSize
            | Feature::NoseWidth
            | Feature::LipFullness
            | Feature::MouthWidth
            | Feature::EyebrowThickness
            | Feature::Cheekbones
            | Feature::ForeheadHeight => "medium",
        }
    }

    fn scalar_of(self, name: &str) -> f32 {
        self.vocabulary()
            .iter()
            .find(|t| t.name == name)
            .map_or(0.5, |t| t.value)
    }

    /// First vocabulary term whose name or alias appears as whole words in `text`.
    fn match_term(self, text: &str) -> Option<&'static str> {
        let words = tokenize(text);
        self.vocabulary()
            .iter()
            .find(|t| std::iter::once(&t.name).chain(t.aliases).any(|p| contains_phrase(&words, p)))
            .map(|t| t.name)
    }
}

/// Numeric profile attributes, in embedding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    EyeDistance,
    NoseWidth,
    MouthWidth,
    FaceRatio,
    ForeheadHeight,
    Age,
}

impl Measure {
    pub const ALL: [Measure; 6] = [
        Measure::EyeDistance,
        Measure::NoseWidth,
        Measure::MouthWidth,
        Measure::FaceRatio,
        Measure::ForeheadHeight,
        Measure::Age,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Measure::EyeDistance => "eye_distance_pct",
            Measure::NoseWidth => "nose_width_pct",
            Measure::MouthWidth => "mouth_width_pct",
            Measure::FaceRatio => "face_height_to_width",
            Measure::ForeheadHeight => "forehead_height_pct",
            Measure::Age => "apparent_age",
        }
    }

    fn nested_paths(self) -> &'static [&'static str] {
        match self {
            Measure::EyeDistance => &["/proportions/eye_distance", "/measurements/eye_distance"],
            Measure::NoseWidth => &["/proportions/nose_width", "/measurements/nose_width"],
            Measure::MouthWidth => &["/proportions/mouth_width", "/measurements/mouth_width"],
            Measure::FaceRatio => &["/proportions/face_ratio", "/measurements/face_ratio"],
            Measure::ForeheadHeight => &["/proportions/forehead_height", "/measurements/forehead_height"],
            Measure::Age => &["/age", "/demographics/age"],
        }
    }

    /// Regex locating the value in free text; group 1 is the number.
    fn pattern(self) -> &'static str {
        match self {
            Measure::EyeDistance => r"eye[\s_-]*(?:distance|spacing)[^0-9\n]{0,30}?(\d+(?:\.\d+)?)",
            Measure::NoseWidth => r"nose[\s_-]*width[^0-9\n]{0,30}?(\d+(?:\.\d+)?)",
            Measure::MouthWidth => r"mouth[\s_-]*width[^0-9\n]{0,30}?(\d+(?:\.\d+)?)",
            Measure::FaceRatio => r"(?:face[\s_-]*)?(?:ratio|height[\s_-]*to[\s_-]*width)[^0-9\n]{0,30}?(\d+(?:\.\d+)?)",
            Measure::ForeheadHeight => r"forehead[\s_-]*height[^0-9\n]{0,30}?(\d+(?:\.\d+)?)",
            Measure::Age => r"(?:\bage[^0-9\n]{0,20}?(\d{1,3})\b|\b(\d{1,3})\s*(?:-\s*)?(?:years?|yrs?|y/o))",
        }
    }

    /// Plausible range mapped onto [0, 1].
    pub fn range(self) -> (f64, f64) {
        match self {
            Measure::EyeDistance => (25.0, 55.0),
            Measure::NoseWidth => (15.0, 40.0),
            Measure::MouthWidth => (30.0, 60.0),
            Measure::FaceRatio => (1.0, 1.8),
            Measure::ForeheadHeight => (20.0, 45.0),
            Measure::Age => (0.0, 100.0),
        }
    }

    pub fn default_value(self) -> f64 {
        match self {
            Measure::EyeDistance => 40.0,
            Measure::NoseWidth => 25.0,
            Measure::MouthWidth => 45.0,
            Measure::FaceRatio => 1.35,
            Measure::ForeheadHeight => 33.0,
            Measure::Age => 35.0,
        }
    }

    fn is_percentage(self) -> bool {
        !matches!(self, Measure::FaceRatio | Measure::Age)
    }

    /// Percentages reported as fractions (0.42) are scaled to 42.
    fn canonical(self, raw: f64) -> Option<f64> {
        if !raw.is_finite() || raw < 0.0 {
            return None;
        }
        Some(if self.is_percentage() && raw <= 1.0 { raw * 100.0 } else { raw })
    }

    fn normalize(self, value: f64) -> f64 {
        let (lo, hi) = self.range();
        ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
    }
}

/// Marks recognised by keyword extraction.
const MARK_WORDS: &[&str] = &[
    "scar", "mole", "freckles", "tattoo", "birthmark", "piercing", "glasses", "beard", "mustache",
    "dimples",
];

/// Which parsing pass produced a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseSource {
    Strict,
    Repaired,
    Keywords,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacialProfile {
    features: BTreeMap<Feature, Attr<&'static str>>,
    measures: BTreeMap<Measure, Attr<f64>>,
    pub marks: Vec<String>,
    pub source: ParseSource,
}

impl FacialProfile {
    /// Profile with every attribute unknown.
    pub fn empty(source: ParseSource) -> Self {
        Self {
            features: Feature::ALL.iter().map(|&f| (f, Attr::Unknown)).collect(),
            measures: Measure::ALL.iter().map(|&m| (m, Attr::Unknown)).collect(),
            marks: Vec::new(),
            source,
        }
    }

    pub fn feature(&self, feature: Feature) -> Attr<&'static str> {
        self.features.get(&feature).copied().unwrap_or(Attr::Unknown)
    }

    pub fn measure(&self, measure: Measure) -> Attr<f64> {
        self.measures.get(&measure).copied().unwrap_or(Attr::Unknown)
    }

    /// Set a feature from free text; values outside the vocabulary stay unknown.
    pub fn set_feature(&mut self, feature: Feature, text: &str) {
        self.features.insert(feature, feature.match_term(text).into());
    }

    pub fn set_measure(&mut self, measure: Measure, raw: f64) {
        self.measures.insert(measure, measure.canonical(raw).into());
    }

    /// Feature value with the default applied.
    pub fn term(&self, feature: Feature) -> &'static str {
        self.feature(feature).or(feature.default_term())
    }

    /// Feature value as its vocabulary scalar in [0, 1].
    pub fn scalar(&self, feature: Feature) -> f32 {
        feature.scalar_of(self.term(feature))
    }

    /// Measure with the default applied, normalized into [0, 1].
    pub fn normalized(&self, measure: Measure) -> f64 {
        measure.normalize(self.measure(measure).or(measure.default_value()))
    }

    pub fn known_count(&self) -> usize {
        self.features.values().filter(|a| a.is_known()).count()
            + self.measures.values().filter(|a| a.is_known()).count()
    }
}

/// Outcome of parsing the model's answer.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileParse {
    Profile(FacialProfile),
    /// The model stated that no face is visible, or the answer carried no
    /// recognizable attribute at all (refusals, error text, junk).
    NoFace,
}

/// Parse a vision model answer: strict JSON, repaired JSON, then keywords.
pub fn parse_profile(text: &str) -> ProfileParse {
    match parse_any(text) {
        ProfileParse::Profile(p) if p.known_count() == 0 && p.marks.is_empty() => {
            tracing::debug!(source = ?p.source, "profile: no recognizable attribute in answer");
            ProfileParse::NoFace
        }
        parsed => parsed,
    }
}

/// True when a JSON object carries at least one profile key.
pub fn is_profile_object(obj: &Map<String, Value>) -> bool {
    obj.contains_key("face_detected")
        || obj.contains_key("special_marks")
        || Feature::ALL.iter().any(|f| obj.contains_key(f.key()))
        || Measure::ALL.iter().any(|m| obj.contains_key(m.key()))
}

fn parse_any(text: &str) -> ProfileParse {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(obj)) => return from_json(&obj, ParseSource::Strict),
        Ok(_) => tracing::debug!("profile: answer is JSON but not an object"),
        Err(e) => tracing::debug!(error = %e, "profile: strict parse failed"),
    }

    if let Some(repaired) = repair_json(text) {
        match serde_json::from_str::<Value>(&repaired) {
            Ok(Value::Object(obj)) => return from_json(&obj, ParseSource::Repaired),
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "profile: repaired parse failed"),
        }
    }

    tracing::debug!("profile: falling back to keyword extraction");
    from_keywords(text)
}

/// Best-effort cleanup of almost-JSON model output.
pub fn repair_json(text: &str) -> Option<String> {
    static SINGLE_QUOTED: OnceLock<Regex> = OnceLock::new();
    static TRAILING_COMMA: OnceLock<Regex> = OnceLock::new();
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    let body = text[start..=end]
        .replace("\\n", " ")
        .replace("\\r", " ")
        .replace("\\t", " ")
        .replace("\\\"", "\"");
    let body: String = body.chars().map(|c| if c.is_control() { ' ' } else { c }).collect();

    let single = SINGLE_QUOTED.get_or_init(|| {
        Regex::new(r#"(?P<pre>[{\[,:]\s*)'(?P<inner>[^'"]*)'"#).expect("valid regex")
    });
    let body = single.replace_all(&body, "$pre\"$inner\"");
    let trailing = TRAILING_COMMA.get_or_init(|| Regex::new(r",\s*(?P<close>[}\]])").expect("valid regex"));
    let body = trailing.replace_all(&body, "$close");
    let ws = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    Some(ws.replace_all(&body, " ").into_owned())
}

fn from_json(obj: &Map<String, Value>, source: ParseSource) -> ProfileParse {
    if obj.get("face_detected").is_some_and(is_negative) {
        return ProfileParse::NoFace;
    }

    let root = Value::Object(obj.clone());
    let lookup = |key: &str, nested: &[&str]| -> Option<Value> {
        obj.get(key)
            .or_else(|| nested.iter().find_map(|p| root.pointer(p)))
            .filter(|v| !v.is_null())
            .cloned()
    };

    let mut profile = FacialProfile::empty(source);
    for feature in Feature::ALL {
        if let Some(Value::String(s)) = lookup(feature.key(), feature.nested_paths()) {
            profile.set_feature(feature, &s);
        }
    }
    for measure in Measure::ALL {
        if let Some(v) = lookup(measure.key(), measure.nested_paths()).as_ref().and_then(number_of) {
            profile.set_measure(measure, v);
        }
    }
    profile.marks = match lookup("special_marks", &["/marks", "/distinguishing_marks"]) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty() && s != "none")
            .collect(),
        Some(Value::String(s)) => s
            .split(&[',', ';'][..])
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty() && m != "none")
            .collect(),
        _ => Vec::new(),
    };

    ProfileParse::Profile(profile)
}

/// `false`, `0`, or a string such as `"false"` / `"no"`.
fn is_negative(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "false" | "no" | "none" | "0"),
        _ => false,
    }
}

/// A JSON number, or the first number inside a string such as `"42%"`.
fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => first_number(s),
        _ => None,
    }
}

fn first_number(text: &str) -> Option<f64> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let re = NUMBER.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid regex"));
    re.find(text)?.as_str().parse().ok()
}

fn from_keywords(text: &str) -> ProfileParse {
    static NO_FACE: OnceLock<Regex> = OnceLock::new();
    static MEASURES: OnceLock<Vec<(Measure, Regex)>> = OnceLock::new();

    let lower = text.to_lowercase();
    let no_face = NO_FACE.get_or_init(|| {
        Regex::new(r"\b(?:no (?:human )?faces?|face (?:is )?not (?:visible|detected|found))\b")
            .expect("valid regex")
    });
    if no_face.is_match(&lower) {
        return ProfileParse::NoFace;
    }

    let mut profile = FacialProfile::empty(ParseSource::Keywords);
    let clauses: Vec<Vec<&str>> = lower.split(&['\n', ';', '.'][..]).map(tokenize).collect();
    for feature in Feature::ALL {
        let labels = feature.labels();
        let hit = clauses
            .iter()
            .filter(|words| labels.is_empty() || labels.iter().any(|l| words.contains(l)))
            .find_map(|words| feature.match_term(&words.join(" ")));
        profile.features.insert(feature, hit.into());
    }

    let measures = MEASURES.get_or_init(|| {
        Measure::ALL
            .iter()
            .map(|&m| (m, Regex::new(m.pattern()).expect("valid regex")))
            .collect()
    });
    for (measure, re) in measures {
        let value = re
            .captures(&lower)
            .and_then(|c| c.iter().skip(1).flatten().next())
            .and_then(|m| m.as_str().parse::<f64>().ok());
        if let Some(v) = value {
            profile.set_measure(*measure, v);
        }
    }

    let words = tokenize(&lower);
    profile.marks = MARK_WORDS
        .iter()
        .filter(|m| words.iter().any(|w| w.trim_end_matches('s') == m.trim_end_matches('s')))
        .map(|m| m.to_string())
        .collect();

    ProfileParse::Profile(profile)
}

fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

fn contains_phrase(words: &[&str], phrase: &str) -> bool {
    let wanted: Vec<String> = tokenize(phrase).iter().map(|w| w.to_lowercase()).collect();
    if wanted.is_empty() || wanted.len() > words.len() {
        return false;
    }
    words
        .windows(wanted.len())
        .any(|win| win.iter().zip(&wanted).all(|(a, b)| a.eq_ignore_ascii_case(b)))
}
