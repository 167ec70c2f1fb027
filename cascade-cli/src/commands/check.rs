use std::collections::BTreeMap;
use std::path::Path;

use cascade_core::config::{ChainConfig, LevelConfig};
use cascade_core::model::{AutoSelect, SelectionMode};

use super::load_config;

#[derive(Debug)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub hint: Option<String>,
}

impl Check {
    fn ok(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            hint: None,
        }
    }

    fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

pub fn run_check(path: Option<&Path>) -> anyhow::Result<()> {
    println!("Cascade Check\n");

    let (path, config) = load_config(path)?;
    println!("Configuration: {}", path.display());
    if let Some(name) = &config.name {
        println!("Chain: {} ({} form)", name, config.mode);
    }
    println!();

    println!("Levels:");
    for line in level_tree(&config) {
        println!("  {}", line);
    }
    println!();

    let checks = check_levels(&config);
    println!("Checks:");
    for check in &checks {
        print_check(check);
    }
    println!();

    let failed = checks.iter().filter(|c| !c.passed).count();
    if failed == 0 {
        println!("All checks passed!");
        Ok(())
    } else {
        anyhow::bail!("{} check(s) failed", failed)
    }
}

fn print_check(check: &Check) {
    let icon = if check.passed { "✓" } else { "✗" };
    let color = if check.passed { "\x1b[32m" } else { "\x1b[31m" };
    let reset = "\x1b[0m";

    println!(
        "  {}{}{} {}: {}",
        color, icon, reset, check.name, check.message
    );

    if let Some(hint) = &check.hint {
        println!("    └─ {}", hint);
    }
}

fn describe(level: &LevelConfig) -> String {
    let mut flags = Vec::new();
    if !level.required {
        flags.push("optional".to_string());
    }
    match level.cache_slot().scope_key(SelectionMode::Platform) {
        Some(key) if level.mode_scoped => flags.push(format!(
            "cache {}/{}",
            key,
            level
                .cache_slot()
                .scope_key(SelectionMode::Business)
                .unwrap_or_default()
        )),
        Some(key) => flags.push(format!("cache {}", key)),
        None => flags.push("no cache".to_string()),
    }
    if level.auto_select != AutoSelect::Cached {
        flags.push(format!("{:?}", level.auto_select).to_lowercase());
    }

    let name = match &level.label {
        Some(_) => format!("{} \"{}\"", level.id, level.display_name()),
        None => level.id.clone(),
    };
    format!("{} [{}]", name, flags.join(", "))
}

/// Levels depth-first, children indented under their parent
fn level_tree(config: &ChainConfig) -> Vec<String> {
    let mut children: BTreeMap<Option<&str>, Vec<&LevelConfig>> = BTreeMap::new();
    for level in &config.levels {
        children
            .entry(level.parent.as_deref())
            .or_default()
            .push(level);
    }

    let mut lines = Vec::new();
    let mut stack: Vec<(&LevelConfig, usize)> = children
        .get(&None)
        .map(|roots| roots.iter().rev().map(|l| (*l, 0)).collect())
        .unwrap_or_default();
    while let Some((level, depth)) = stack.pop() {
        let prefix = if depth == 0 {
            String::new()
        } else {
            format!("{}└─ ", "   ".repeat(depth - 1))
        };
        lines.push(format!("{}{}", prefix, describe(level)));
        if let Some(kids) = children.get(&Some(level.id.as_str())) {
            stack.extend(kids.iter().rev().map(|l| (*l, depth + 1)));
        }
    }
    lines
}

fn check_levels(config: &ChainConfig) -> Vec<Check> {
    let mut checks = vec![Check::ok(
        "levels",
        format!("{} level(s), no cycles, single root", config.levels.len()),
    )];

    // two levels writing the same key would overwrite each other's memory
    for mode in [SelectionMode::Platform, SelectionMode::Business] {
        let mut owners: BTreeMap<String, &str> = BTreeMap::new();
        for level in &config.levels {
            let Some(key) = level.cache_slot().scope_key(mode) else {
                continue;
            };
            if let Some(other) = owners.insert(key.clone(), &level.id) {
                checks.push(
                    Check::fail(
                        &level.id,
                        format!("cache key '{}' is also used by '{}' ({} form)", key, other, mode),
                    )
                    .with_hint("set a distinct cache_key on one of the levels"),
                );
            }
        }
    }

    for level in &config.levels {
        if level.mode_scoped && !level.cache {
            checks.push(
                Check::fail(&level.id, "mode_scoped has no effect with cache disabled")
                    .with_hint("drop mode_scoped or enable cache"),
            );
        }
        if level.cache_key.is_some() && !level.cache {
            checks.push(
                Check::fail(&level.id, "cache_key is ignored with cache disabled")
                    .with_hint("drop cache_key or enable cache"),
            );
        }
    }

    if checks.len() == 1 {
        checks.push(Check::ok("cache", "every cached level has its own key"));
    }
    checks
}
