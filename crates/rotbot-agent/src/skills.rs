//! Skills — markdown files with YAML-style frontmatter, injected into the
//! agent's context.
//!
//! ```text
//! ---
//! name: github
//! description: Interact with GitHub repositories
//! alwaysLoad: false
//! ---
//! # GitHub Skill
//! Instructions for using GitHub...
//! ```
//!
//! `alwaysLoad: true` skills are included whole in every prompt; the rest are
//! advertised by summary only.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

/// One loaded skill.
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub content: String,
    pub always_load: bool,
}

impl Skill {
    fn summary(&self) -> String {
        format!("- **{}**: {}", self.name, self.description)
    }

    fn full_prompt(&self) -> String {
        format!("\n## Skill: {}\n{}", self.name, self.content)
    }
}

/// All skills loaded from the workspace skills directory.
#[derive(Debug, Default)]
pub struct SkillSet {
    skills: HashMap<String, Skill>,
}

impl SkillSet {
    /// Load every `*.md` file in `dir`. Files that fail to parse are skipped
    /// with a warning.
    pub fn load_dir(dir: &Path) -> Self {
        let mut set = SkillSet::default();
        let Ok(entries) = std::fs::read_dir(dir) else {
            return set;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    let stem = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("skill")
                        .to_string();
                    set.insert_parsed(&stem, &text);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to read skill file"),
            }
        }
        if !set.skills.is_empty() {
            let names: Vec<&str> = set.skills.keys().map(|s| s.as_str()).collect();
            info!(count = set.skills.len(), skills = names.join(", "), "loaded skills");
        }
        set
    }

    fn insert_parsed(&mut self, default_name: &str, text: &str) {
        let (meta, content) = parse_frontmatter(text);
        let name = meta
            .get("name")
            .cloned()
            .unwrap_or_else(|| default_name.to_string());
        let description = meta.get("description").cloned().unwrap_or_default();
        let always_load = meta
            .get("alwaysLoad")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "yes"))
            .unwrap_or(false);
        self.skills.insert(
            name.clone(),
            Skill {
                name,
                description,
                content: content.trim().to_string(),
                always_load,
            },
        );
    }

    /// Full prompt bodies for always-loaded skills.
    pub fn always_load_prompts(&self) -> Vec<String> {
        let mut prompts: Vec<(&String, String)> = self
            .skills
            .iter()
            .filter(|(_, s)| s.always_load)
            .map(|(name, s)| (name, s.full_prompt()))
            .collect();
        prompts.sort_by(|a, b| a.0.cmp(b.0));
        prompts.into_iter().map(|(_, p)| p).collect()
    }

    /// One summary block advertising on-demand skills, or `None` when there
    /// are none.
    pub fn summary_index(&self) -> Option<String> {
        let mut on_demand: Vec<&Skill> =
            self.skills.values().filter(|s| !s.always_load).collect();
        if on_demand.is_empty() {
            return None;
        }
        on_demand.sort_by(|a, b| a.name.cmp(&b.name));
        let mut lines =
            vec!["## Available Skills (use LOAD_SKILL: <name> to activate)".to_string()];
        lines.extend(on_demand.iter().map(|s| s.summary()));
        Some(lines.join("\n"))
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    pub fn list(&self) -> Vec<&str> {
        self.skills.keys().map(|s| s.as_str()).collect()
    }
}

/// Split markdown into frontmatter key/values and body. Text without a
/// leading `---` block is all body.
fn parse_frontmatter(text: &str) -> (HashMap<String, String>, String) {
    let Some(rest) = text.strip_prefix("---") else {
        return (HashMap::new(), text.to_string());
    };
    let Some(end) = rest.find("\n---") else {
        return (HashMap::new(), text.to_string());
    };

    let frontmatter = &rest[..end];
    let body = rest[end + 4..].trim_start_matches('\n').to_string();

    let mut meta = HashMap::new();
    for line in frontmatter.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            let value = value.trim();
            if !key.is_empty() {
                meta.insert(key.to_string(), value.to_string());
            }
        }
    }
    (meta, body)
}
