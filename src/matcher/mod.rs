/// Exercise catalog matching
///
/// Inferred exercise names are free text from a vision model; the matcher
/// maps each one onto the app's exercise catalog so imported workouts link
/// to real catalog entries. Matching never changes the workout shape: the
/// output has exactly one result per input, in input order, and a name
/// with no good match is reported unmatched rather than guessed.
use crate::config::MatcherConfig;
use crate::inference::InferredExercise;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strsim::jaro_winkler;
use tracing::debug;

/// One entry in the app's exercise catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogExercise {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Catalog lookup seam. The builtin catalog covers common strength
/// movements; an app ships its own implementation backed by its database.
pub trait ExerciseCatalog: Send + Sync {
    fn entries(&self) -> &[CatalogExercise];

    fn find_by_id(&self, id: &str) -> Option<CatalogExercise> {
        self.entries().iter().find(|e| e.id == id).cloned()
    }

    /// Ranked free-text search over names and aliases
    fn search(&self, query: &str, limit: usize) -> Vec<(CatalogExercise, f32)> {
        let normalized = normalize(query);
        if normalized.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(CatalogExercise, f32)> = self
            .entries()
            .iter()
            .map(|entry| (entry.clone(), best_similarity(&normalized, entry)))
            .filter(|(_, score)| *score > 0.4)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

/// Built-in catalog of common strength movements
pub struct BuiltinCatalog {
    entries: Vec<CatalogExercise>,
}

impl BuiltinCatalog {
    pub fn new() -> Self {
        let raw: &[(&str, &str, &[&str])] = &[
            ("squat", "Barbell Squat", &["back squat", "squats"]),
            ("front-squat", "Front Squat", &[]),
            ("goblet-squat", "Goblet Squat", &[]),
            ("split-squat", "Bulgarian Split Squat", &["bulgarian squat", "rear foot elevated split squat"]),
            ("deadlift", "Deadlift", &["conventional deadlift", "deadlifts"]),
            ("rdl", "Romanian Deadlift", &["rdl", "stiff leg deadlift", "romanian dl"]),
            ("hip-thrust", "Hip Thrust", &["barbell hip thrust", "glute bridge"]),
            ("lunge", "Walking Lunge", &["lunges", "forward lunge"]),
            ("reverse-lunge", "Reverse Lunge", &[]),
            ("leg-press", "Leg Press", &[]),
            ("leg-extension", "Leg Extension", &["quad extension"]),
            ("leg-curl", "Leg Curl", &["hamstring curl", "lying leg curl"]),
            ("calf-raise", "Calf Raise", &["standing calf raise", "calf raises"]),
            ("bench-press", "Bench Press", &["barbell bench", "flat bench"]),
            ("incline-press", "Incline Bench Press", &["incline press", "incline bench"]),
            ("db-press", "Dumbbell Press", &["dumbbell bench press", "db bench"]),
            ("ohp", "Overhead Press", &["ohp", "shoulder press", "military press"]),
            ("lateral-raise", "Lateral Raise", &["side raise", "lat raise", "side lateral"]),
            ("front-raise", "Front Raise", &[]),
            ("chest-fly", "Chest Fly", &["pec fly", "dumbbell fly", "cable fly"]),
            ("pushup", "Push-Up", &["push up", "pushups", "press up"]),
            ("dip", "Dip", &["dips", "tricep dip"]),
            ("pullup", "Pull-Up", &["pull up", "pullups"]),
            ("chinup", "Chin-Up", &["chin up", "chinups"]),
            ("lat-pulldown", "Lat Pulldown", &["pulldown", "pull down"]),
            ("row", "Barbell Row", &["bent over row", "bb row"]),
            ("db-row", "Dumbbell Row", &["one arm row", "single arm row"]),
            ("cable-row", "Seated Cable Row", &["seated row", "cable row"]),
            ("face-pull", "Face Pull", &["face pulls"]),
            ("shrug", "Shrug", &["shrugs", "barbell shrug"]),
            ("bicep-curl", "Bicep Curl", &["curl", "curls", "dumbbell curl", "barbell curl"]),
            ("hammer-curl", "Hammer Curl", &["hammer curls"]),
            ("tricep-extension", "Tricep Extension", &["overhead extension", "skullcrusher", "skull crusher"]),
            ("tricep-pushdown", "Tricep Pushdown", &["pushdown", "rope pushdown", "cable pushdown"]),
            ("plank", "Plank", &["planks", "front plank"]),
            ("crunch", "Crunch", &["crunches", "ab crunch"]),
            ("leg-raise", "Hanging Leg Raise", &["leg raises", "hanging knee raise"]),
            ("russian-twist", "Russian Twist", &[]),
            ("kb-swing", "Kettlebell Swing", &["kettlebell swings", "kb swing"]),
            ("thruster", "Thruster", &["thrusters"]),
            ("burpee", "Burpee", &["burpees"]),
            ("mountain-climber", "Mountain Climber", &["mountain climbers"]),
        ];

        let entries = raw
            .iter()
            .map(|(id, name, aliases)| CatalogExercise {
                id: id.to_string(),
                name: name.to_string(),
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
            })
            .collect();

        Self { entries }
    }
}

impl Default for BuiltinCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ExerciseCatalog for BuiltinCatalog {
    fn entries(&self) -> &[CatalogExercise] {
        &self.entries
    }
}

/// Match outcome for one inferred exercise
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// The name as the model produced it
    pub input_name: String,

    pub matched: bool,

    pub catalog_id: Option<String>,

    pub catalog_name: Option<String>,

    /// 1.0 exact, 0.95 alias, 0.9 substring, else the similarity score;
    /// 0.0 when unmatched
    pub confidence: f32,
}

impl MatchResult {
    fn unmatched(input_name: &str) -> Self {
        Self {
            input_name: input_name.to_string(),
            matched: false,
            catalog_id: None,
            catalog_name: None,
            confidence: 0.0,
        }
    }
}

/// Maps inferred exercise names onto catalog entries
pub struct ExerciseMatcher {
    catalog: Arc<dyn ExerciseCatalog>,
    config: MatcherConfig,
}

impl ExerciseMatcher {
    pub fn new(catalog: Arc<dyn ExerciseCatalog>, config: MatcherConfig) -> Self {
        Self { catalog, config }
    }

    /// Match every exercise in an inferred workout.
    ///
    /// The output always has the same length and order as the input.
    pub fn match_workout(&self, exercises: &[InferredExercise]) -> Vec<MatchResult> {
        exercises
            .iter()
            .map(|exercise| self.match_name(&exercise.name))
            .collect()
    }

    /// Cascade: exact name, exact alias, substring, then fuzzy similarity
    /// over names and aliases with a configured floor
    pub fn match_name(&self, input: &str) -> MatchResult {
        let normalized = normalize(input);
        if normalized.is_empty() {
            return MatchResult::unmatched(input);
        }

        for entry in self.catalog.entries() {
            if normalize(&entry.name) == normalized {
                return self.hit(input, entry, 1.0);
            }
        }

        for entry in self.catalog.entries() {
            if entry.aliases.iter().any(|a| normalize(a) == normalized) {
                return self.hit(input, entry, 0.95);
            }
        }

        for entry in self.catalog.entries() {
            let name = normalize(&entry.name);
            if name.contains(&normalized) || normalized.contains(&name) {
                return self.hit(input, entry, 0.9);
            }
        }

        let mut best: Option<(&CatalogExercise, f32)> = None;
        for entry in self.catalog.entries() {
            let score = best_similarity(&normalized, entry);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((entry, score));
            }
        }

        match best {
            Some((entry, score)) if score >= self.config.fuzzy_threshold => {
                self.hit(input, entry, score)
            }
            _ => {
                debug!("No catalog match for '{}'", input);
                MatchResult::unmatched(input)
            }
        }
    }

    /// Ranked catalog candidates for a manual picker UI
    pub fn search(&self, query: &str) -> Vec<(CatalogExercise, f32)> {
        self.catalog.search(query, self.config.search_limit)
    }

    pub fn find_by_id(&self, id: &str) -> Option<CatalogExercise> {
        self.catalog.find_by_id(id)
    }

    fn hit(&self, input: &str, entry: &CatalogExercise, confidence: f32) -> MatchResult {
        MatchResult {
            input_name: input.to_string(),
            matched: true,
            catalog_id: Some(entry.id.clone()),
            catalog_name: Some(entry.name.clone()),
            confidence,
        }
    }
}

/// Replace the match at one position with a manually chosen catalog entry.
///
/// Only the addressed result changes; its input name and every other
/// result are left exactly as they were.
pub fn apply_review_selection(
    results: &mut [MatchResult],
    index: usize,
    chosen: &CatalogExercise,
) -> Result<()> {
    let len = results.len();
    let result = results
        .get_mut(index)
        .ok_or_else(|| anyhow!("exercise index {} out of range ({} results)", index, len))?;

    result.matched = true;
    result.catalog_id = Some(chosen.id.clone());
    result.catalog_name = Some(chosen.name.clone());
    result.confidence = 1.0;
    Ok(())
}

/// Lowercase, trim, strip punctuation to spaces, collapse runs
fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_space = true;
    for c in name.to_lowercase().chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

fn best_similarity(normalized_input: &str, entry: &CatalogExercise) -> f32 {
    let mut best = jaro_winkler(normalized_input, &normalize(&entry.name)) as f32;
    for alias in &entry.aliases {
        let score = jaro_winkler(normalized_input, &normalize(alias)) as f32;
        if score > best {
            best = score;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> ExerciseMatcher {
        ExerciseMatcher::new(Arc::new(BuiltinCatalog::new()), MatcherConfig::default())
    }

    fn inferred(name: &str) -> InferredExercise {
        InferredExercise {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_exact_match() {
        let result = matcher().match_name("Bench Press");
        assert!(result.matched);
        assert_eq!(result.catalog_id.as_deref(), Some("bench-press"));
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_alias_match() {
        let result = matcher().match_name("RDL");
        assert!(result.matched);
        assert_eq!(result.catalog_id.as_deref(), Some("rdl"));
        assert_eq!(result.confidence, 0.95);
    }

    #[test]
    fn test_substring_match() {
        let result = matcher().match_name("heavy barbell squat");
        assert!(result.matched);
        assert_eq!(result.catalog_id.as_deref(), Some("squat"));
    }

    #[test]
    fn test_fuzzy_match_typo() {
        let result = matcher().match_name("bench pres");
        assert!(result.matched);
        assert_eq!(result.catalog_id.as_deref(), Some("bench-press"));
        assert!(result.confidence >= 0.85);
    }

    #[test]
    fn test_no_match_reported_not_guessed() {
        let result = matcher().match_name("interpretive dance");
        assert!(!result.matched);
        assert_eq!(result.confidence, 0.0);
        assert!(result.catalog_id.is_none());
        assert_eq!(result.input_name, "interpretive dance");
    }

    #[test]
    fn test_workout_match_preserves_shape() {
        let workout = vec![
            inferred("Squat"),
            inferred("something unrecognizable xyz"),
            inferred("Hip Thrust"),
        ];

        let results = matcher().match_workout(&workout);
        assert_eq!(results.len(), 3);
        assert!(results[0].matched);
        assert!(!results[1].matched);
        assert!(results[2].matched);
        assert_eq!(results[1].input_name, "something unrecognizable xyz");
    }

    #[test]
    fn test_review_mutates_only_target_index() {
        let workout = vec![inferred("Squat"), inferred("mystery move"), inferred("Deadlift")];
        let m = matcher();
        let mut results = m.match_workout(&workout);
        let before_first = results[0].clone();
        let before_last = results[2].clone();

        let chosen = CatalogExercise {
            id: "kb-swing".to_string(),
            name: "Kettlebell Swing".to_string(),
            aliases: vec![],
        };
        apply_review_selection(&mut results, 1, &chosen).unwrap();

        assert!(results[1].matched);
        assert_eq!(results[1].catalog_id.as_deref(), Some("kb-swing"));
        assert_eq!(results[1].confidence, 1.0);
        assert_eq!(results[1].input_name, "mystery move");

        assert_eq!(results[0].catalog_id, before_first.catalog_id);
        assert_eq!(results[2].catalog_id, before_last.catalog_id);
    }

    #[test]
    fn test_review_out_of_range_rejected() {
        let mut results = vec![MatchResult::unmatched("squat")];
        let chosen = CatalogExercise {
            id: "squat".to_string(),
            name: "Barbell Squat".to_string(),
            aliases: vec![],
        };
        assert!(apply_review_selection(&mut results, 5, &chosen).is_err());
    }

    #[test]
    fn test_catalog_search_ranked() {
        let m = matcher();
        let results = m.search("curl");
        assert!(!results.is_empty());
        assert!(results.len() <= MatcherConfig::default().search_limit);
        // Best candidate first
        for window in results.windows(2) {
            assert!(window[0].1 >= window[1].1);
        }
        assert_eq!(results[0].0.id, "bicep-curl");
    }
}
