//! Public entry points: loading rule files into an [`Engine`], annotating
//! [`Document`]s and summarizing each run.

use crate::document::Document;
use crate::engine::{self, AnnotationKey, CompiledRules, KeyRegistry, Loader, RuleMeta, RuleType, Runner, RunMetrics};
use crate::error::{LoadError, LoadErrors};
use crate::syntax;
use once_cell::sync::Lazy;
use std::path::Path;
use std::time::Duration;

static DEFAULT_ENGINE: Lazy<Engine> = Lazy::new(|| {
    Engine::from_source(crate::rules::BUILTIN_NAME, crate::rules::BUILTIN).expect("bundled rules file must load")
});

/// Engine-wide options.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Maximum backtracking steps for one token-pattern attempt.
    pub step_limit: usize,
    /// Maximum composite iterations per stage.
    pub composite_limit: usize,
    /// Skip rules that fail to compile instead of failing the load.
    pub lenient: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { step_limit: 100_000, composite_limit: 50, lenient: false }
    }
}

/// One rules file, identified by `name` in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFile {
    pub name: String,
    pub text: String,
}

impl RuleFile {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self { name: name.into(), text: text.into() }
    }

    /// Read a rules file from disk; the path becomes its name.
    pub fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Ok(Self { name: path.display().to_string(), text })
    }
}

/// Match count for one rule after a document run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCount {
    pub name: String,
    pub rule_type: RuleType,
    pub stage: i64,
    pub matches: usize,
}

/// Timing and counts for one stage of a document run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTiming {
    pub stage: i64,
    pub duration: Duration,
    /// Scan and its actions.
    pub scan_duration: Duration,
    /// All composite iterations.
    pub composite_duration: Duration,
    /// Matches committed by the scan (text and token rules).
    pub committed: usize,
    /// Filter matches found before the scan.
    pub filtered: usize,
    /// Candidates vetoed by a filter match.
    pub vetoed: usize,
    /// Composite iterations that committed something.
    pub composite_iterations: usize,
    /// Matches committed by composite rules.
    pub composite_committed: usize,
}

/// Result of [`Engine::annotate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Per-rule match counts, in declaration order.
    pub rules: Vec<RuleCount>,
    pub stages: Vec<StageTiming>,
    /// Total elapsed time for the document.
    pub total: Duration,
    /// Annotation writes that changed a token.
    pub changed: usize,
    /// Runtime errors recorded on the document during this run.
    pub diagnostics: usize,
}

impl RunSummary {
    pub fn total_matches(&self) -> usize {
        self.rules.iter().map(|r| r.matches).sum()
    }

    /// Match count of the first rule called `name`.
    pub fn count(&self, name: &str) -> Option<usize> {
        self.rules.iter().find(|r| r.name == name).map(|r| r.matches)
    }
}

/// A loaded, compiled rule set.
///
/// An engine is immutable after loading and can be shared across threads;
/// each [`Document`] carries its own annotations and diagnostics.
///
/// # Example
/// ```
/// use rulener::{Document, Engine};
///
/// let engine = Engine::from_source(
///     "demo.rules",
///     r#"
///     ner = { type: "CLASS", value: "NamedEntityTag" }
///     { ruleType: "tokens", pattern: ( /acme/ ), action: ( Annotate($0, ner, "ORG") ) }
///     "#,
/// )
/// .unwrap();
///
/// let mut doc = Document::from_words(&["acme", "sells", "anvils"]);
/// engine.annotate(&mut doc);
/// let ner = engine.key("ner").unwrap();
/// assert_eq!(doc.token(0).unwrap().get(ner).and_then(|v| v.as_str()), Some("ORG"));
/// ```
#[derive(Debug)]
pub struct Engine {
    rules: CompiledRules,
    options: Options,
    warnings: Vec<LoadError>,
}

impl Engine {
    /// Load `files` in the given order.
    ///
    /// Bindings and `ENV` settings carry forward from one file to the next and
    /// declaration order is global across files. Every error found is
    /// returned together; parse errors stop the load before any resolution.
    pub fn load(files: &[RuleFile], options: &Options) -> Result<Self, LoadErrors> {
        let mut parsed = Vec::with_capacity(files.len());
        let mut parse_errors = Vec::new();
        for file in files {
            match syntax::parse_source(&file.name, &file.text) {
                Ok(items) => parsed.push((file.name.as_str(), items)),
                Err(errors) => parse_errors.extend(errors),
            }
        }
        if !parse_errors.is_empty() {
            return Err(LoadErrors::new(parse_errors));
        }

        let mut loader = Loader::new();
        for (name, items) in parsed {
            log::debug!("loading `{name}`: {} items", items.len());
            loader.load_file(name, items);
        }
        let (decls, keys, mut errors) = loader.finish();
        match engine::loader::build(decls, keys, options.lenient) {
            Ok((rules, warnings)) if errors.is_empty() => Ok(Self { rules, options: options.clone(), warnings }),
            Ok(_) => Err(LoadErrors::new(errors)),
            Err(compile_errors) => {
                errors.extend(compile_errors);
                Err(LoadErrors::new(errors))
            }
        }
    }

    /// Load a single rules text with default options.
    pub fn from_source(name: &str, text: &str) -> Result<Self, LoadErrors> {
        Self::load(&[RuleFile::new(name, text)], &Options::default())
    }

    /// Run every stage over `doc`, writing annotations onto its tokens.
    ///
    /// Runtime faults never abort the run; they are recorded on
    /// [`Document::diagnostics`] and counted in the summary.
    pub fn annotate(&self, doc: &mut Document) -> RunSummary {
        let before = doc.diagnostics().len();
        let runner = Runner::new(&self.rules, self.options.step_limit, self.options.composite_limit);
        let metrics = runner.run(doc);
        self.summarize(&metrics, doc.diagnostics().len() - before)
    }

    /// Annotation key bound to `name` (e.g. `"ner"`).
    pub fn key(&self, name: &str) -> Option<AnnotationKey> {
        self.rules.keys.get(name)
    }

    pub fn keys(&self) -> &KeyRegistry {
        &self.rules.keys
    }

    /// Compile errors of rules skipped by a lenient load.
    pub fn warnings(&self) -> &[LoadError] {
        &self.warnings
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Loaded rules in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = &RuleMeta> + '_ {
        self.rules.rules.iter().map(|r| &r.meta)
    }

    pub fn len(&self) -> usize {
        self.rules.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.rules.is_empty()
    }

    fn summarize(&self, metrics: &RunMetrics, diagnostics: usize) -> RunSummary {
        let rules = self
            .rules
            .rules
            .iter()
            .zip(&metrics.rule_matches)
            .map(|(rule, &matches)| RuleCount {
                name: rule.meta.name.clone(),
                rule_type: rule.meta.rule_type,
                stage: rule.meta.stage,
                matches,
            })
            .collect();

        let stages = metrics
            .stages
            .iter()
            .map(|s| StageTiming {
                stage: s.stage,
                duration: s.duration,
                scan_duration: s.scan.duration,
                composite_duration: s.composite.iter().map(|p| p.duration).sum(),
                committed: s.scan.committed,
                filtered: s.filtered,
                vetoed: s.scan.vetoed + s.composite.iter().map(|p| p.vetoed).sum::<usize>(),
                composite_iterations: s.composite.len(),
                composite_committed: s.composite.iter().map(|p| p.committed).sum(),
            })
            .collect();

        RunSummary { rules, stages, total: metrics.total, changed: metrics.changed(), diagnostics }
    }
}

/// The engine built from the bundled sample rules (colors, `foo`, SSNs).
pub fn default_engine() -> &'static Engine {
    &DEFAULT_ENGINE
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: &str = r#"
        ner = { type: "CLASS", value: "NamedEntityTag" }
        tag = { type: "CLASS", value: "PartOfSpeech" }
    "#;

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }

    #[test]
    fn default_engine_loads_bundled_rules() {
        let engine = default_engine();
        assert!(!engine.is_empty());
        assert!(engine.key("ner").is_some());
        assert!(engine.key("normalized").is_some());
        assert!(engine.warnings().is_empty());
    }

    #[test]
    fn load_reports_parse_errors_from_every_file() {
        let files = [
            RuleFile::new("a.rules", "{ ruleType: \"tokens\", pattern: ( /a/ ) action: () }"),
            RuleFile::new("b.rules", "/* nope */"),
        ];
        let errors = Engine::load(&files, &Options::default()).unwrap_err();
        let names: Vec<&str> = errors
            .errors()
            .iter()
            .map(|e| match e {
                LoadError::Parse { source_name, .. } => source_name.as_str(),
                other => panic!("expected a parse error, got {other:?}"),
            })
            .collect();
        assert!(names.contains(&"a.rules"), "{errors}");
        assert!(names.contains(&"b.rules"), "{errors}");
    }

    #[test]
    fn lenient_load_skips_rules_that_fail_to_compile() {
        let text = format!(
            "{KEYS}
            {{ ruleType: \"tokens\", name: \"broken\", pattern: ( /(unclosed/ ), action: ( Annotate($0, ner, \"X\") ) }}
            {{ ruleType: \"tokens\", name: \"fine\", pattern: ( /ok/ ), action: ( Annotate($0, ner, \"OK\") ) }}"
        );
        let files = [RuleFile::new("mixed.rules", text)];

        let strict = Engine::load(&files, &Options::default()).unwrap_err();
        assert_eq!(strict.len(), 1);
        assert!(matches!(strict.into_vec().as_slice(), [err] if err.is_compile()));

        let engine = Engine::load(&files, &Options { lenient: true, ..Options::default() }).unwrap();
        assert!(engine.options().lenient);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.warnings().len(), 1);
        assert_eq!(engine.rules().next().map(|r| r.name.as_str()), Some("fine"));
    }

    #[test]
    fn lenient_load_still_fails_on_resolution_errors() {
        let text = format!(
            "{KEYS}
            {{ ruleType: \"tokens\", pattern: ( /ok/ ), action: ( Annotate($0, missing, \"X\") ) }}"
        );
        let options = Options { lenient: true, ..Options::default() };
        let errors = Engine::load(&[RuleFile::new("r.rules", text)], &options).unwrap_err();
        assert!(matches!(errors.errors()[0], LoadError::Resolution { .. }));
    }

    #[test]
    fn annotate_returns_counts_in_declaration_order() {
        let text = format!(
            "{KEYS}
            {{ ruleType: \"tokens\", name: \"second-stage\", stage: 2, pattern: ( [ {{ ner: \"ANIMAL\" }} ] ),
               action: ( Annotate($0, tag, \"NN\") ) }}
            {{ ruleType: \"tokens\", name: \"animals\", pattern: ( /cat|dog/ ), action: ( Annotate($0, ner, \"ANIMAL\") ) }}"
        );
        let engine = Engine::from_source("counts.rules", &text).unwrap();
        let mut doc = Document::from_words(&["cat", "and", "dog"]);
        let summary = engine.annotate(&mut doc);

        let names: Vec<&str> = summary.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["second-stage", "animals"]);
        assert_eq!(summary.count("animals"), Some(2));
        assert_eq!(summary.count("second-stage"), Some(2));
        assert_eq!(summary.total_matches(), 4);
        assert_eq!(summary.changed, 4);
        assert_eq!(summary.diagnostics, 0);
        assert_eq!(summary.stages.iter().map(|s| s.stage).collect::<Vec<_>>(), [0, 2]);
        assert!(summary.stages.iter().all(|s| s.duration <= summary.total));
    }

    #[test]
    fn step_limit_is_reported_as_a_diagnostic() {
        let text = format!(
            "{KEYS}
            {{ ruleType: \"tokens\", name: \"explosive\", pattern: ( ( []* )* /never/ ), action: ( Annotate($0, ner, \"X\") ) }}"
        );
        let options = Options { step_limit: 1_000, ..Options::default() };
        let engine = Engine::load(&[RuleFile::new("slow.rules", text)], &options).unwrap();
        let words: Vec<String> = (0..30).map(|i| format!("w{i}")).collect();
        let mut doc = Document::from_words(&words);

        let summary = engine.annotate(&mut doc);
        assert_eq!(summary.diagnostics, 1);
        assert_eq!(summary.count("explosive"), Some(0));
        assert!(matches!(doc.diagnostics()[0], crate::RuntimeError::Match { .. }));
    }
}
