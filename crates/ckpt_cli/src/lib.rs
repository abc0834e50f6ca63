use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use worldplay::{read_checkpoint, reconcile, Checkpoint, CheckpointEntry, LoadReport};

pub enum CommandKind {
    Inspect { path: PathBuf },
    Match { checkpoint: PathBuf, names: PathBuf },
}

/// One parameter name per line; blank lines and `#` comments are ignored.
pub fn parse_name_list(content: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        names.insert(trimmed.to_string());
    }
    names
}

pub fn render_inspect(checkpoint: &Checkpoint) -> Vec<String> {
    let mut lines = vec![format!("entries: {}", checkpoint.len())];
    for (name, entry) in checkpoint.entries() {
        match entry {
            CheckpointEntry::Tensor(tensor) => {
                lines.push(format!("tensor {name} {:?}", tensor.shape()));
            }
            CheckpointEntry::Group(members) => {
                lines.push(format!("group {name} ({} members)", members.len()));
                for (member, tensor) in members {
                    lines.push(format!("  tensor {name}/{member} {:?}", tensor.shape()));
                }
            }
        }
    }
    lines
}

pub fn render_report(report: &LoadReport) -> Vec<String> {
    let mut lines = vec![
        format!("ema: {}", if report.used_ema { "yes" } else { "no" }),
        format!(
            "applied: {}/{} ({:.1}%)",
            report.applied_count(),
            report.total_count(),
            report.fraction_applied() * 100.0
        ),
    ];
    lines.extend(report.applied.iter().map(|name| format!("+ {name}")));
    lines.extend(report.skipped.iter().map(|name| format!("- {name}")));
    lines
}

pub fn run<W: Write>(kind: CommandKind, stdout: &mut W) -> Result<(), String> {
    let lines = match kind {
        CommandKind::Inspect { path } => render_inspect(&load(&path)?),
        CommandKind::Match { checkpoint, names } => {
            let content = fs::read_to_string(&names).map_err(|error| {
                format!("failed to read name list '{}': {error}", names.display())
            })?;
            let outcome = reconcile(load(&checkpoint)?, &parse_name_list(&content));
            render_report(&outcome.report)
        }
    };
    for line in lines {
        writeln!(stdout, "{line}").map_err(|error| format!("failed to write output: {error}"))?;
    }
    Ok(())
}

fn load(path: &Path) -> Result<Checkpoint, String> {
    read_checkpoint(path).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use worldplay::{write_checkpoint, ParamSet, Tensor};

    use super::*;

    fn sample() -> Checkpoint {
        let mut checkpoint = Checkpoint::new();
        checkpoint.insert_tensor("decoder.bias", Tensor::zeros(vec![3]));
        checkpoint.insert_tensor("legacy.scale", Tensor::zeros(vec![1]));
        checkpoint
    }

    #[test]
    fn parse_name_list_ignores_blank_and_comment_lines() {
        let content = r#"
            # decoder
            decoder.weight

            decoder.bias
            # dynamics
        "#;
        let names = parse_name_list(content);
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["decoder.bias".to_string(), "decoder.weight".to_string()]
        );
    }

    #[test]
    fn inspect_lists_tensors_and_group_members() {
        let mut checkpoint = sample();
        let mut ema = ParamSet::new();
        ema.insert("decoder.bias".to_string(), Tensor::zeros(vec![3]));
        checkpoint.insert_group("ema", ema);

        assert_eq!(
            render_inspect(&checkpoint),
            vec![
                "entries: 3".to_string(),
                "tensor decoder.bias [3]".to_string(),
                "group ema (1 members)".to_string(),
                "  tensor ema/decoder.bias [3]".to_string(),
                "tensor legacy.scale [1]".to_string(),
            ]
        );
    }

    #[test]
    fn match_reports_applied_and_skipped_names() {
        let temp = TempDir::new().expect("temp");
        let ckpt = temp.path().join("model.wpck");
        let names = temp.path().join("names.txt");
        write_checkpoint(&ckpt, &sample()).expect("write");
        fs::write(&names, "decoder.bias\ndecoder.weight\n").expect("names");

        let mut out = Vec::new();
        run(
            CommandKind::Match {
                checkpoint: ckpt,
                names,
            },
            &mut out,
        )
        .expect("run");

        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(
            text,
            "ema: no\napplied: 1/2 (50.0%)\n+ decoder.bias\n- legacy.scale\n"
        );
    }

    #[test]
    fn unreadable_checkpoint_is_reported() {
        let temp = TempDir::new().expect("temp");
        let mut out = Vec::new();
        let err = run(
            CommandKind::Inspect {
                path: temp.path().join("missing.wpck"),
            },
            &mut out,
        )
        .err()
        .expect("must fail");
        assert!(err.contains("missing.wpck"));
    }
}
