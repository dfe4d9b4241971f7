//! 🔌 The generic client adapter — glob discovery, path-context
//! extraction, and priority-ordered regex parsing of individual lines.
//!
//! Think of it like a very diligent intern who reads every log file,
//! never complains, and turns "[10:00] <alice> hi" into a struct without
//! ever asking why. The intern is a Vec of compiled regexes. 🦆

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::envsub;
use crate::filters;
use crate::record::{
    ClientInfo, MessageRecord, ParsedMessage, Sender, Target, TargetKind, parse_timestamp,
};
use crate::store::model::{ClientConfig, ParserRule, PathPattern};

/// 🗺️ Target/server context extracted from a log file's path, handed to
/// `parse_line` alongside each line from that file. The path knows things
/// the line doesn't.
#[derive(Debug, Clone, Default)]
pub struct PathContext {
    pub target: Option<Target>,
    pub server_identifier: Option<String>,
}

struct CompiledRule {
    rule: ParserRule,
    regex: Regex,
}

struct CompiledPattern {
    regex: Regex,
    group: usize,
}

pub struct ClientAdapter {
    config: ClientConfig,
    log_directory: PathBuf,
    rules: Vec<CompiledRule>,
    console_pattern: Option<CompiledPattern>,
    channel_pattern: Option<CompiledPattern>,
    query_pattern: Option<CompiledPattern>,
    server_pattern: Option<CompiledPattern>,
}

impl ClientAdapter {
    /// 🏗️ Build an adapter from its config. `logDirectory` gets
    /// environment substitution; an empty one falls back to
    /// `default_log_directory`. Rules are compiled once and sorted by
    /// descending priority (stable, so declaration order breaks ties) —
    /// we compile at startup so the hot path just matches, like a civilized
    /// program.
    pub fn new(config: ClientConfig, default_log_directory: Option<&str>) -> Result<Self> {
        let raw_dir = if config.log_directory.trim().is_empty() {
            default_log_directory.unwrap_or_default().to_string()
        } else {
            config.log_directory.clone()
        };
        let log_directory = PathBuf::from(envsub::expand_str(&raw_dir));

        let mut rules = Vec::with_capacity(config.parser_rules.len());
        for rule in &config.parser_rules {
            let regex = filters::compile(&rule.pattern, &rule.flags).with_context(|| {
                format!(
                    "client '{}' parser rule '{}' has an invalid pattern",
                    config.id, rule.name
                )
            })?;
            rules.push(CompiledRule {
                rule: rule.clone(),
                regex,
            });
        }
        rules.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));

        let compile_path = |pattern: &Option<PathPattern>, label: &str| {
            pattern
                .as_ref()
                .map(|p| {
                    filters::compile(&p.pattern, "")
                        .map(|regex| CompiledPattern {
                            regex,
                            group: p.group,
                        })
                        .with_context(|| {
                            format!("client '{}' {label} is not a valid regex", config.id)
                        })
                })
                .transpose()
        };
        let console_pattern = compile_path(&config.discovery.console_pattern, "consolePattern")?;
        let channel_pattern = compile_path(&config.discovery.channel_pattern, "channelPattern")?;
        let query_pattern = compile_path(&config.discovery.query_pattern, "queryPattern")?;
        let server_pattern = compile_path(&config.discovery.server_pattern, "serverPattern")?;

        Ok(Self {
            config,
            log_directory,
            rules,
            console_pattern,
            channel_pattern,
            query_pattern,
            server_pattern,
        })
    }

    pub fn initialize(&self) -> Result<()> {
        if !self.log_directory.is_dir() {
            warn!(
                client = %self.config.id,
                dir = %self.log_directory.display(),
                "log directory does not exist yet"
            );
        }
        debug!(
            client = %self.config.id,
            dir = %self.log_directory.display(),
            rules = self.rules.len(),
            "client adapter initialized"
        );
        Ok(())
    }

    pub fn destroy(&self) {
        debug!(client = %self.config.id, "client adapter destroyed");
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn log_directory(&self) -> &Path {
        &self.log_directory
    }

    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            id: self.config.id.clone(),
            client_type: self.config.client_type.clone(),
            name: self.config.name.clone(),
            metadata: self.config.metadata.clone(),
        }
    }

    /// 🌐 Every defined glob pattern evaluated under the log directory;
    /// the de-duplicated union, files only. Directories need not apply.
    pub fn list_log_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        let groups = [
            &self.config.discovery.console,
            &self.config.discovery.channels,
            &self.config.discovery.queries,
        ];
        for patterns in groups {
            for pattern in patterns {
                let full = self.log_directory.join(pattern);
                let Some(full) = full.to_str() else { continue };
                let entries = match glob::glob(full) {
                    Ok(entries) => entries,
                    Err(err) => {
                        warn!(client = %self.config.id, pattern, %err, "bad discovery glob");
                        continue;
                    }
                };
                for entry in entries.flatten() {
                    if entry.is_file() && !paths.contains(&entry) {
                        paths.push(entry);
                    }
                }
            }
        }
        paths
    }

    /// 🎯 Apply the console, channel, then query patterns to `path`; the
    /// first match decides the target. The server pattern contributes the
    /// server identifier independently — it's on its own journey.
    pub fn extract_context_from_path(&self, path: &Path) -> PathContext {
        let text = path.to_string_lossy();
        let mut context = PathContext::default();

        let kinds = [
            (TargetKind::Console, &self.console_pattern),
            (TargetKind::Channel, &self.channel_pattern),
            (TargetKind::Query, &self.query_pattern),
        ];
        for (kind, pattern) in kinds {
            if let Some(pattern) = pattern
                && let Some(name) = capture_group(pattern, &text)
            {
                context.target = Some(Target { name, kind });
                break;
            }
        }
        if let Some(pattern) = &self.server_pattern {
            context.server_identifier = capture_group(pattern, &text);
        }
        context
    }

    /// 🔤 Parse one line against the sorted rule list. The first match
    /// wins; a matching `skip` rule discards the line; no match yields
    /// nothing. Most lines are nothing. That's showbiz. 🎬
    pub fn parse_line(&self, line: &str, context: &PathContext) -> Option<MessageRecord> {
        for compiled in &self.rules {
            let Some(captures) = compiled.regex.captures(line) else {
                continue;
            };
            if compiled.rule.skip {
                return None;
            }
            return Some(self.build_record(line, compiled, &captures, context));
        }
        None
    }

    fn build_record(
        &self,
        line: &str,
        compiled: &CompiledRule,
        captures: &regex::Captures<'_>,
        context: &PathContext,
    ) -> MessageRecord {
        let mut record = MessageRecord::new(line, self.client_info());
        record.target = context.target.clone();
        if let Some(identifier) = &context.server_identifier {
            record
                .metadata
                .insert("serverIdentifier".to_string(), Value::String(identifier.clone()));
        }

        let mut content: Option<String> = None;
        let mut sender = Sender::default();
        let mut has_sender = false;

        for (capture_name, semantic) in &compiled.rule.fields {
            let Some(value) = captures.name(capture_name).map(|m| m.as_str().to_string())
            else {
                continue;
            };
            match semantic.as_str() {
                "timestamp" => {
                    if let Some(parsed) = parse_timestamp(&value) {
                        record.timestamp = parsed;
                    }
                    record.raw.timestamp = Some(value);
                }
                "nickname" => {
                    sender.nickname = value;
                    has_sender = true;
                }
                "username" => {
                    sender.username = Some(value);
                    has_sender = true;
                }
                "hostname" => {
                    sender.hostname = Some(value);
                    has_sender = true;
                }
                "content" => content = Some(value),
                "target" => {
                    let kind = if value.starts_with('#') || value.starts_with('&') {
                        TargetKind::Channel
                    } else {
                        TargetKind::Query
                    };
                    record.target = Some(Target { name: value, kind });
                }
                other => {
                    record
                        .metadata
                        .insert(other.to_string(), Value::String(value));
                }
            }
        }

        if has_sender {
            record.sender = Some(sender);
        }
        record.message = match (content, &compiled.rule.message_type) {
            (Some(content), kind) => Some(ParsedMessage {
                content,
                kind: kind.clone().unwrap_or_else(|| "privmsg".to_string()),
            }),
            (None, Some(kind)) => Some(ParsedMessage {
                content: line.to_string(),
                kind: kind.clone(),
            }),
            (None, None) => None,
        };
        record
    }
}

fn capture_group(pattern: &CompiledPattern, text: &str) -> Option<String> {
    pattern
        .regex
        .captures(text)?
        .get(pattern.group)
        .map(|m| m.as_str().to_string())
}
