use crate::engine::ReconcileSummary;
use colored::Colorize;
use miette::Result;

/// Terminal reporter with colored output
pub struct TerminalReporter;

impl TerminalReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn report(&self, summary: &ReconcileSummary) -> Result<()> {
        println!();
        if summary.splits_merged == 0 {
            println!("{}", "Single package, nothing to merge.".green().bold());
        } else {
            println!(
                "{}",
                format!("Merged {} split(s) into the base package:", summary.splits_merged)
                    .bold()
            );
            println!(
                "  {} {} file(s) copied, {} skipped, {} values document(s) merged",
                "[+]".green(),
                summary.files_copied,
                summary.files_skipped,
                summary.values_documents_merged
            );
        }

        if summary.identifiers_resolved > 0 || summary.identifiers_unresolved > 0 {
            println!(
                "  {} resolved {} resource identifier(s): {} definition(s) renamed, {} reference(s) updated",
                "[+]".green(),
                summary.identifiers_resolved,
                summary.definitions_renamed,
                summary.references_updated
            );
        }
        if summary.duplicates_dropped > 0 || summary.style_items_dropped > 0 {
            println!(
                "  {} dropped {} duplicate definition(s), {} duplicate style item(s)",
                "[+]".green(),
                summary.duplicates_dropped,
                summary.style_items_dropped
            );
        }
        if summary.manifest_attributes_removed > 0 || summary.manifest_elements_removed > 0 {
            println!(
                "  {} disabled APK splitting: {} attribute(s), {} element(s) removed",
                "[+]".green(),
                summary.manifest_attributes_removed,
                summary.manifest_elements_removed
            );
        }
        if summary.ampersand_fixes > 0 {
            println!(
                "  {} repaired {} bare ampersand(s)",
                "[+]".green(),
                summary.ampersand_fixes
            );
        }
        if summary.resources_publicized > 0 {
            println!(
                "  {} forced {} resource(s) public",
                "[+]".green(),
                summary.resources_publicized
            );
        }

        self.print_warnings(summary);

        println!();
        println!("{}", "Reconciliation complete.".green().bold());
        Ok(())
    }

    fn print_warnings(&self, summary: &ReconcileSummary) {
        if summary.identifiers_unresolved > 0 {
            println!(
                "  {} {} placeholder name(s) could not be resolved and were left untouched",
                "[~]".yellow(),
                summary.identifiers_unresolved
            );
        }
        if !summary.conflicts.is_empty() {
            println!(
                "  {} {} conflicting binding(s), base wins:",
                "[~]".yellow(),
                summary.conflicts.len()
            );
            for conflict in &summary.conflicts {
                println!("      {}", conflict.yellow());
            }
        }
        if summary.publicize_skipped > 0 {
            println!(
                "  {} {} resource(s) left private: no id space for their type",
                "[~]".yellow(),
                summary.publicize_skipped
            );
        }
        if summary.obfuscation_detected {
            println!(
                "  {} {}",
                "[~]".yellow(),
                "ProGuard/AndResGuard detected, recompile may not succeed".yellow()
            );
        }
    }
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}
