//! Per-file transformation orchestrator.
//!
//! Pipeline for one file:
//!
//! 1. Parse; a failed parse skips the file with a warning.
//! 2. Dead-branch elimination to a fixpoint: scan usages, decide fates,
//!    apply edits, re-parse. Each round strictly reduces the remaining
//!    flag references; nested constructs surface in later rounds.
//! 3. Re-parse and remove flag definitions. Offsets from earlier parses
//!    are stale by construction, so this re-parse is mandatory.
//! 4. Re-parse and drop flag-service imports whose usage sites were all
//!    eliminated.
//! 5. Optionally run the formatter; failures downgrade to warnings.
//!
//! Every stage owns its state exclusively; the only shared input is the
//! read-only [`FlagConfig`].

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::analyze::analyze;
use crate::config::FlagConfig;
use crate::edit::apply_edits;
use crate::error::{Result, UnflagError};
use crate::format::{Formatter, PassthroughFormatter};
use crate::parse::{parse_source, ParsedUnit};
use crate::pattern::PatternSet;
use crate::rewrite::{plan_rewrites, removal_edit};
use crate::scan::imports::{is_flag_service, scan_imports};
use crate::scan::{scan_definitions, scan_usages};

/// Upper bound on elimination rounds; reached only by a planner bug.
const MAX_ELIMINATION_ROUNDS: usize = 8;

/// Outcome of transforming one file.
#[derive(Debug)]
pub struct TransformationResult {
    pub original_source: String,
    pub transformed_source: String,
    pub removed_flag_names: BTreeSet<String>,
    pub removed_import_uris: BTreeSet<String>,
    pub lines_removed: usize,
    pub warnings: Vec<String>,
    pub has_changes: bool,
}

impl TransformationResult {
    fn unchanged(source: &str, warnings: Vec<String>) -> Self {
        Self {
            original_source: source.to_string(),
            transformed_source: source.to_string(),
            removed_flag_names: BTreeSet::new(),
            removed_import_uris: BTreeSet::new(),
            lines_removed: 0,
            warnings,
            has_changes: false,
        }
    }

    /// One-line summary in the CLI's reporting format.
    pub fn summary(&self) -> String {
        format!(
            "{} flag(s) removed, {} import(s) removed, {} line(s) removed",
            self.removed_flag_names.len(),
            self.removed_import_uris.len(),
            self.lines_removed
        )
    }
}

/// The flag-removal engine for one configuration.
///
/// Cheap to share: per-file state lives inside each `transform_*` call,
/// so one remover serves any number of files, in parallel if desired.
pub struct FlagRemover<'a> {
    config: &'a FlagConfig,
    patterns: PatternSet,
    formatter: Box<dyn Formatter>,
}

impl<'a> FlagRemover<'a> {
    pub fn new(config: &'a FlagConfig) -> Self {
        Self {
            config,
            patterns: PatternSet::from_config(&config.patterns.methods),
            formatter: Box::new(PassthroughFormatter),
        }
    }

    /// Replace the output formatter.
    pub fn with_formatter(mut self, formatter: Box<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Transform a file on disk. Reads only; writing is the caller's
    /// decision (dry-run simply never writes).
    pub fn transform_file(&self, path: &Path) -> Result<TransformationResult> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| UnflagError::io_with_path(e, path))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("input.ts");
        Ok(self.transform_source(&source, file_name))
    }

    /// Transform source text. Never fails: internal errors leave the
    /// source unchanged and are reported through `warnings`.
    pub fn transform_source(&self, source: &str, file_name: &str) -> TransformationResult {
        let mut warnings = Vec::new();
        let mut removed_flag_names = BTreeSet::new();
        let mut removed_import_uris = BTreeSet::new();

        // Step 1: parse. Unparseable files are skipped, not rewritten.
        let unit = match parse_source(source, file_name) {
            Ok(unit) => unit,
            Err(err) => {
                warnings.push(err.to_string());
                return TransformationResult::unchanged(source, warnings);
            }
        };

        // Import usage evidence must predate any edits.
        let imports_before = scan_imports(&unit);

        // Step 2: dead-branch elimination to a fixpoint.
        let mut current = unit;
        for round in 0..MAX_ELIMINATION_ROUNDS {
            let scan = scan_usages(&current, self.config, &self.patterns);
            let plans = analyze(&current, &scan.references);
            let outcome =
                plan_rewrites(&current.source, &plans, &scan.references, &self.config.settings);
            if outcome.edits.is_empty() {
                break;
            }
            debug!(round, edits = outcome.edits.len(), "eliminating dead branches");

            let next_source = match apply_edits(&current.source, &outcome.edits) {
                Ok(s) => s,
                Err(err) => {
                    // Planner bug: abort this file with the source unchanged.
                    warnings.push(format!("internal error, file left unchanged: {err}"));
                    return TransformationResult::unchanged(source, warnings);
                }
            };
            removed_flag_names.extend(outcome.touched_flags);

            current = match parse_source(&next_source, file_name) {
                Ok(unit) => unit,
                Err(err) => {
                    warnings.push(format!(
                        "transformed source failed to re-parse, cleanup skipped: {err}"
                    ));
                    return self.finish(
                        source,
                        next_source,
                        removed_flag_names,
                        removed_import_uris,
                        warnings,
                    );
                }
            };
        }

        // Step 3: definition removal, on a fresh scan of the fresh tree.
        let after_definitions =
            self.remove_definitions(current, file_name, &mut removed_flag_names, &mut warnings);

        // Step 4: drop flag-service imports that lost every usage site.
        let transformed = match after_definitions {
            Ok(unit) => self.remove_dead_imports(
                unit,
                &imports_before,
                &mut removed_import_uris,
                &mut warnings,
            ),
            // Re-parse failed after definition removal: keep the edited
            // text but skip import cleanup.
            Err(text) => text,
        };

        self.finish(
            source,
            transformed,
            removed_flag_names,
            removed_import_uris,
            warnings,
        )
    }

    /// Remove definitions. Returns the re-parsed unit on success, or the
    /// edited text when it no longer parses (import cleanup is skipped).
    fn remove_definitions(
        &self,
        unit: ParsedUnit,
        file_name: &str,
        removed_flag_names: &mut BTreeSet<String>,
        warnings: &mut Vec<String>,
    ) -> std::result::Result<ParsedUnit, String> {
        let scan = scan_usages(&unit, self.config, &self.patterns);
        let definitions = scan_definitions(&unit, self.config, &scan.bindings);
        if definitions.is_empty() {
            return Ok(unit);
        }

        let preserve_comments = self.config.settings.preserve_comments;
        let edits: Vec<_> = definitions
            .iter()
            .map(|d| removal_edit(&unit.source, d.span, preserve_comments))
            .collect();

        match apply_edits(&unit.source, &edits) {
            Ok(next) => {
                for definition in &definitions {
                    removed_flag_names.insert(definition.flag_name.clone());
                }
                match parse_source(&next, file_name) {
                    Ok(fresh) => Ok(fresh),
                    Err(err) => {
                        warn!(file = file_name, "definition removal broke the parse");
                        warnings.push(format!(
                            "source failed to re-parse after definition removal, \
                             import cleanup skipped: {err}"
                        ));
                        Err(next)
                    }
                }
            }
            Err(err) => {
                warnings.push(format!("definition removal skipped: {err}"));
                Ok(unit)
            }
        }
    }

    fn remove_dead_imports(
        &self,
        unit: ParsedUnit,
        imports_before: &[crate::scan::imports::ImportRecord],
        removed_import_uris: &mut BTreeSet<String>,
        warnings: &mut Vec<String>,
    ) -> String {
        let imports_after = scan_imports(&unit);
        let mut edits = Vec::new();
        let mut claimed_offsets = std::collections::BTreeSet::new();

        for before in imports_before {
            // Only imports that lost usage sites to the transform qualify:
            // pre-existing dead imports and side-effect imports stay.
            if before.usage_count == 0 || !is_flag_service(before, self.config) {
                continue;
            }
            let after = imports_after
                .iter()
                .find(|candidate| candidate.identity() == before.identity());
            if let Some(after) = after {
                // Duplicate directives share an identity; claim each byte
                // range once.
                if after.usage_count == 0 && claimed_offsets.insert(after.span.start) {
                    debug!(uri = %after.uri, "removing flag-service import");
                    edits.push(removal_edit(
                        &unit.source,
                        after.span,
                        self.config.settings.preserve_comments,
                    ));
                    removed_import_uris.insert(after.uri.clone());
                }
            }
        }

        if edits.is_empty() {
            return unit.source;
        }
        match apply_edits(&unit.source, &edits) {
            Ok(next) => next,
            Err(err) => {
                warnings.push(format!("import cleanup skipped: {err}"));
                removed_import_uris.clear();
                unit.source
            }
        }
    }

    fn finish(
        &self,
        original: &str,
        transformed: String,
        removed_flag_names: BTreeSet<String>,
        removed_import_uris: BTreeSet<String>,
        mut warnings: Vec<String>,
    ) -> TransformationResult {
        let formatted = if self.config.settings.format_output {
            match self.formatter.format(&transformed) {
                Ok(out) => out,
                Err(err) => {
                    warnings.push(format!("formatter failed, keeping unformatted output: {err}"));
                    transformed
                }
            }
        } else {
            transformed
        };

        let original_lines = original.lines().count();
        let final_lines = formatted.lines().count();
        let has_changes = formatted != original;

        TransformationResult {
            original_source: original.to_string(),
            transformed_source: formatted,
            removed_flag_names,
            removed_import_uris,
            lines_removed: original_lines.saturating_sub(final_lines),
            warnings,
            has_changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingFormatter;

    impl Formatter for FailingFormatter {
        fn format(&self, _source: &str) -> Result<String> {
            Err(UnflagError::FormatFailed("formatter exited 1".to_string()))
        }
    }

    struct UppercasingFormatter;

    impl Formatter for UppercasingFormatter {
        fn format(&self, source: &str) -> Result<String> {
            Ok(source.to_uppercase())
        }
    }

    const CONFIG: &str = "\
patterns:
  methods: ['*.isEnabled']
flags:
  f: true
settings:
  format_output: true
";

    #[test]
    fn summary_reports_all_three_counts() {
        let result = TransformationResult {
            original_source: String::new(),
            transformed_source: String::new(),
            removed_flag_names: ["a".to_string(), "b".to_string()].into(),
            removed_import_uris: ["./x".to_string()].into(),
            lines_removed: 7,
            warnings: Vec::new(),
            has_changes: true,
        };
        assert_eq!(
            result.summary(),
            "2 flag(s) removed, 1 import(s) removed, 7 line(s) removed"
        );
    }

    #[test]
    fn formatter_failure_is_a_warning_not_an_error() {
        let (config, _) = FlagConfig::parse(CONFIG, false).unwrap();
        let remover = FlagRemover::new(&config).with_formatter(Box::new(FailingFormatter));
        let result =
            remover.transform_source("if (flags.isEnabled('f')) { go(); }\n", "a.ts");

        assert_eq!(result.transformed_source, "go();\n");
        assert!(result.has_changes);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("formatter failed"));
    }

    #[test]
    fn formatter_runs_only_when_configured() {
        let yaml = "patterns:\n  methods: ['*.isEnabled']\nflags:\n  f: true\n";
        let (config, _) = FlagConfig::parse(yaml, false).unwrap();
        let remover = FlagRemover::new(&config).with_formatter(Box::new(UppercasingFormatter));
        let result = remover.transform_source("keep();\n", "a.ts");
        assert_eq!(result.transformed_source, "keep();\n");

        let (config, _) = FlagConfig::parse(CONFIG, false).unwrap();
        let remover = FlagRemover::new(&config).with_formatter(Box::new(UppercasingFormatter));
        let result = remover.transform_source("keep();\n", "a.ts");
        assert_eq!(result.transformed_source, "KEEP();\n");
        assert!(result.has_changes);
    }

    #[test]
    fn missing_file_is_io_error() {
        let yaml = "flags:\n  f: true\n";
        let (config, _) = FlagConfig::parse(yaml, false).unwrap();
        let remover = FlagRemover::new(&config);
        let err = remover
            .transform_file(Path::new("/nonexistent/app.ts"))
            .unwrap_err();
        assert!(matches!(err, UnflagError::IoWithPath { .. }));
    }
}
