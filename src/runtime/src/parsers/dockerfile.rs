//! Dockerfile parser.
//!
//! Parses a Dockerfile into a sequence of instructions. Supports line
//! continuations (`\`), comments, quoted values, multi-pair `ENV`/`LABEL`,
//! heredocs (`RUN <<EOF`), and both shell and JSON (exec) forms for
//! CMD/ENTRYPOINT.

use std::collections::HashMap;

use ocifit_core::error::{FitError, Result};

/// Command in exec (`["a", "b"]`) or shell (`a b`) form.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandForm {
    Exec(Vec<String>),
    Shell(String),
}

impl CommandForm {
    /// The command as a single line.
    pub fn to_command_line(&self) -> String {
        match self {
            CommandForm::Exec(args) => args.join(" "),
            CommandForm::Shell(command) => command.clone(),
        }
    }
}

/// A single Dockerfile instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `FROM [--platform=<p>] <image> [AS <alias>]`
    From {
        image: String,
        alias: Option<String>,
    },
    /// `RUN <command>`
    Run { command: String },
    /// `COPY [--from=<stage>] <src>... <dst>`
    Copy {
        src: Vec<String>,
        dst: String,
        from: Option<String>,
    },
    /// `ADD <src>... <dst>`
    Add { src: Vec<String>, dst: String },
    /// `WORKDIR <path>`
    Workdir { path: String },
    /// `ENV <key>=<value> ...` or `ENV <key> <value>`
    Env { pairs: Vec<(String, String)> },
    /// `ENTRYPOINT ["exec", "form"]` or `ENTRYPOINT command`
    Entrypoint { command: CommandForm },
    /// `CMD ["exec", "form"]` or `CMD command`
    Cmd { command: CommandForm },
    /// `EXPOSE <port>[/<proto>] ...`
    Expose { ports: Vec<String> },
    /// `LABEL <key>=<value> ...`
    Label { pairs: Vec<(String, String)> },
    /// `USER <user>[:<group>]`
    User { user: String },
    /// `ARG <name>[=<default>]`
    Arg {
        name: String,
        default: Option<String>,
    },
    /// `VOLUME ["/a", "/b"]` or `VOLUME /a /b`
    Volume { paths: Vec<String> },
    /// `MAINTAINER <name>`
    Maintainer { name: String },
    /// SHELL, STOPSIGNAL, HEALTHCHECK, ONBUILD: kept verbatim
    Other { keyword: String, args: String },
}

/// One build stage: its base image and optional alias.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub image: String,
    pub alias: Option<String>,
}

/// Parsed Dockerfile: a list of instructions in order.
#[derive(Debug, Clone)]
pub struct Dockerfile {
    pub instructions: Vec<Instruction>,
}

impl Dockerfile {
    /// Parse a Dockerfile from its text content.
    pub fn parse(content: &str) -> Result<Self> {
        let logical_lines = join_continuation_lines(content);
        let mut instructions = Vec::new();

        for line in &logical_lines {
            let trimmed = line.text.trim();

            // Skip empty lines and comments
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut instruction = parse_instruction(trimmed, line.number)?;
            // `RUN <<EOF` runs the heredoc body as its script
            if let Instruction::Run { command } = &mut instruction {
                if command.starts_with("<<") {
                    if let Some(script) = line.heredocs.first() {
                        *command = script.clone();
                    }
                }
            }
            instructions.push(instruction);
        }

        if instructions.is_empty() {
            return Err(FitError::ParseError(
                "Dockerfile is empty or contains no instructions".to_string(),
            ));
        }

        // Validate: first non-ARG instruction must be FROM
        let first_non_arg = instructions
            .iter()
            .find(|i| !matches!(i, Instruction::Arg { .. }));
        if !matches!(first_non_arg, Some(Instruction::From { .. })) {
            return Err(FitError::ParseError(
                "First instruction must be FROM (or ARG before FROM)".to_string(),
            ));
        }

        Ok(Dockerfile { instructions })
    }

    /// Build stages in order, with ARG defaults declared before the first
    /// FROM substituted into the image names.
    pub fn stages(&self) -> Vec<Stage> {
        let mut global_args: HashMap<&str, &str> = HashMap::new();
        let mut seen_from = false;
        let mut stages = Vec::new();

        for instruction in &self.instructions {
            match instruction {
                Instruction::Arg { name, default } if !seen_from => {
                    if let Some(default) = default {
                        global_args.insert(name.as_str(), default.as_str());
                    }
                }
                Instruction::From { image, alias } => {
                    seen_from = true;
                    stages.push(Stage {
                        image: substitute_args(image, &global_args),
                        alias: alias.clone(),
                    });
                }
                _ => {}
            }
        }

        stages
    }

    /// Base image of the final stage, following references to earlier
    /// stage aliases (`FROM builder`) back to a real image.
    pub fn base_image(&self) -> Option<String> {
        let stages = self.stages();
        let root = *self.lineage_indices(&stages).first()?;
        Some(stages[root].image.clone())
    }

    /// Instructions that make up the final image: the final stage preceded
    /// by every stage it is built `FROM`, oldest first.
    pub fn final_lineage(&self) -> Vec<&Instruction> {
        let stages = self.stages();
        let segments = self.stage_segments();
        self.lineage_indices(&stages)
            .into_iter()
            .filter_map(|i| segments.get(i))
            .flat_map(|segment| segment.iter())
            .collect()
    }

    /// Instructions grouped per stage, each starting with its FROM.
    fn stage_segments(&self) -> Vec<&[Instruction]> {
        let starts: Vec<usize> = self
            .instructions
            .iter()
            .enumerate()
            .filter(|(_, i)| matches!(i, Instruction::From { .. }))
            .map(|(pos, _)| pos)
            .collect();

        starts
            .iter()
            .enumerate()
            .map(|(n, &start)| {
                let end = starts.get(n + 1).copied().unwrap_or(self.instructions.len());
                &self.instructions[start..end]
            })
            .collect()
    }

    /// Stage indices from the root ancestor to the final stage.
    fn lineage_indices(&self, stages: &[Stage]) -> Vec<usize> {
        let Some(mut current) = stages.len().checked_sub(1) else {
            return Vec::new();
        };
        let mut lineage = vec![current];

        // Aliases only resolve to earlier stages, so this terminates
        while let Some(parent) = stages[..current].iter().rposition(|s| {
            s.alias
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(&stages[current].image))
        }) {
            lineage.push(parent);
            current = parent;
        }

        lineage.reverse();
        lineage
    }
}

/// Replace `$NAME` and `${NAME}` with ARG defaults; unknown names are kept.
fn substitute_args(value: &str, args: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match args.get(name) {
            Some(value) if !name.is_empty() => out.push_str(value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}

/// One instruction's worth of source text.
#[derive(Debug, Clone, PartialEq)]
struct LogicalLine {
    /// 1-based source line the instruction starts on
    number: usize,
    text: String,
    /// Heredoc bodies in the order their markers appear
    heredocs: Vec<String>,
}

/// Keywords whose heredoc markers are expanded.
const HEREDOC_KEYWORDS: &[&str] = &["RUN", "COPY", "ADD"];

/// Join lines ending with `\` into single logical lines and fold heredoc
/// bodies into the instruction that opens them.
fn join_continuation_lines(content: &str) -> Vec<LogicalLine> {
    let mut logical_lines = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    let mut lines = content.lines().enumerate();

    while let Some((index, line)) = lines.next() {
        if current.is_empty() {
            start = index + 1;
        } else if line.trim_start().starts_with('#') {
            // Comment lines inside a continuation are dropped
            continue;
        }
        if let Some(stripped) = line.strip_suffix('\\') {
            current.push_str(stripped.trim_end());
            current.push(' ');
            continue;
        }

        current.push_str(line);
        let text = std::mem::take(&mut current);
        let heredocs = heredoc_markers(&text)
            .into_iter()
            .map(|marker| {
                let mut body = Vec::new();
                for (_, line) in lines.by_ref() {
                    let line = if marker.strip_tabs {
                        line.trim_start_matches('\t')
                    } else {
                        line
                    };
                    if line.trim_end() == marker.word {
                        break;
                    }
                    body.push(line);
                }
                body.join("\n")
            })
            .collect();
        logical_lines.push(LogicalLine {
            number: start,
            text,
            heredocs,
        });
    }

    // Handle trailing continuation without final line
    if !current.is_empty() {
        logical_lines.push(LogicalLine {
            number: start,
            text: current,
            heredocs: Vec::new(),
        });
    }

    logical_lines
}

/// A `<<[-]WORD` heredoc opener.
#[derive(Debug, PartialEq)]
struct HeredocMarker {
    word: String,
    strip_tabs: bool,
}

/// Heredoc openers on a RUN/COPY/ADD line. Here-strings (`<<<`) are not
/// openers.
fn heredoc_markers(line: &str) -> Vec<HeredocMarker> {
    let (keyword, rest) = split_first_word(line);
    if !HEREDOC_KEYWORDS.contains(&keyword.to_uppercase().as_str()) {
        return Vec::new();
    }

    let mut markers = Vec::new();
    let mut rest = rest;
    while let Some(pos) = rest.find("<<") {
        let mut after = &rest[pos + 2..];
        if after.starts_with('<') {
            rest = after.trim_start_matches('<');
            continue;
        }
        let strip_tabs = after.starts_with('-');
        if strip_tabs {
            after = &after[1..];
        }
        let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'');
        if let Some(q) = quote {
            after = &after[q.len_utf8()..];
        }
        let end = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if end > 0 {
            markers.push(HeredocMarker {
                word: after[..end].to_string(),
                strip_tabs,
            });
        }
        after = &after[end..];
        if let Some(q) = quote {
            after = after.strip_prefix(q).unwrap_or(after);
        }
        rest = after;
    }
    markers
}

/// Parse a single logical line into an Instruction.
fn parse_instruction(line: &str, line_num: usize) -> Result<Instruction> {
    let (keyword, rest) = split_first_word(line);
    let keyword_upper = keyword.to_uppercase();

    match keyword_upper.as_str() {
        "FROM" => parse_from(rest, line_num),
        "RUN" => parse_run(rest, line_num),
        "COPY" => parse_copy(rest, line_num),
        "ADD" => parse_add(rest, line_num),
        "WORKDIR" => parse_workdir(rest, line_num),
        "ENV" => parse_env(rest, line_num),
        "ENTRYPOINT" => parse_command(rest, line_num, "ENTRYPOINT")
            .map(|command| Instruction::Entrypoint { command }),
        "CMD" => parse_command(rest, line_num, "CMD").map(|command| Instruction::Cmd { command }),
        "EXPOSE" => parse_expose(rest, line_num),
        "LABEL" => parse_label(rest, line_num),
        "USER" => parse_user(rest, line_num),
        "ARG" => parse_arg(rest, line_num),
        "VOLUME" => parse_volume(rest, line_num),
        "MAINTAINER" => Ok(Instruction::Maintainer {
            name: unquote(rest),
        }),
        "SHELL" | "STOPSIGNAL" | "HEALTHCHECK" | "ONBUILD" => Ok(Instruction::Other {
            keyword: keyword_upper,
            args: rest.to_string(),
        }),
        _ => Err(FitError::ParseError(format!(
            "Line {}: Unknown instruction '{}'",
            line_num, keyword
        ))),
    }
}

/// Split a string into the first word and the rest.
fn split_first_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    }
}

fn require_args(rest: &str, line_num: usize, what: &str) -> Result<()> {
    if rest.is_empty() {
        return Err(FitError::ParseError(format!(
            "Line {}: {}",
            line_num, what
        )));
    }
    Ok(())
}

// --- Individual instruction parsers ---

fn parse_from(rest: &str, line_num: usize) -> Result<Instruction> {
    require_args(rest, line_num, "FROM requires an image argument")?;

    let parts: Vec<&str> = rest
        .split_whitespace()
        .filter(|p| !p.starts_with("--"))
        .collect();
    let image = match parts.first() {
        Some(image) => image.to_string(),
        None => {
            return Err(FitError::ParseError(format!(
                "Line {}: FROM requires an image argument",
                line_num
            )))
        }
    };

    // Check for AS alias: FROM image AS alias
    let alias = if parts.len() >= 3 && parts[1].eq_ignore_ascii_case("AS") {
        Some(parts[2].to_string())
    } else {
        None
    };

    Ok(Instruction::From { image, alias })
}

fn parse_run(rest: &str, line_num: usize) -> Result<Instruction> {
    require_args(rest, line_num, "RUN requires a command")?;

    // If JSON array form, extract and join
    let command = if rest.starts_with('[') {
        let parts = parse_json_array(rest, line_num)?;
        parts.join(" ")
    } else {
        rest.to_string()
    };

    Ok(Instruction::Run { command })
}

/// Split `[--flag...] <src>... <dst>`, returning flags separately.
fn split_sources(rest: &str, line_num: usize, keyword: &str) -> Result<(Vec<String>, Vec<String>, String)> {
    let words = if rest.starts_with('[') {
        parse_json_array(rest, line_num)?
    } else {
        shell_words(rest)
    };
    let (flags, mut parts): (Vec<String>, Vec<String>) =
        words.into_iter().partition(|w| w.starts_with("--"));

    if parts.len() < 2 {
        return Err(FitError::ParseError(format!(
            "Line {}: {} requires at least one source and a destination",
            line_num, keyword
        )));
    }

    let dst = parts.pop().unwrap_or_default();
    Ok((flags, parts, dst))
}

fn parse_copy(rest: &str, line_num: usize) -> Result<Instruction> {
    require_args(rest, line_num, "COPY requires source and destination")?;
    let (flags, src, dst) = split_sources(rest, line_num, "COPY")?;
    let from = flags
        .iter()
        .find_map(|f| f.strip_prefix("--from="))
        .map(str::to_string);
    Ok(Instruction::Copy { src, dst, from })
}

fn parse_add(rest: &str, line_num: usize) -> Result<Instruction> {
    require_args(rest, line_num, "ADD requires source and destination")?;
    let (_, src, dst) = split_sources(rest, line_num, "ADD")?;
    Ok(Instruction::Add { src, dst })
}

fn parse_workdir(rest: &str, line_num: usize) -> Result<Instruction> {
    require_args(rest, line_num, "WORKDIR requires a path")?;
    Ok(Instruction::Workdir {
        path: unquote(rest),
    })
}

/// Parse `k=v k2="v 2"` pairs, or the legacy single `KEY VALUE` form.
fn parse_pairs(rest: &str) -> Vec<(String, String)> {
    let words = shell_words(rest);
    let first_is_pair = words.first().is_some_and(|w| w.contains('='));

    if first_is_pair {
        return words
            .into_iter()
            .filter_map(|w| {
                w.split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect();
    }

    // Legacy form: KEY VALUE (value is the raw remainder)
    let (key, value) = split_first_word(rest);
    vec![(unquote(key), unquote(value))]
}

fn parse_env(rest: &str, line_num: usize) -> Result<Instruction> {
    require_args(rest, line_num, "ENV requires a key and value")?;
    Ok(Instruction::Env {
        pairs: parse_pairs(rest),
    })
}

fn parse_command(rest: &str, line_num: usize, keyword: &str) -> Result<CommandForm> {
    require_args(rest, line_num, &format!("{} requires an argument", keyword))?;

    if rest.starts_with('[') {
        Ok(CommandForm::Exec(parse_json_array(rest, line_num)?))
    } else {
        Ok(CommandForm::Shell(rest.to_string()))
    }
}

fn parse_expose(rest: &str, line_num: usize) -> Result<Instruction> {
    require_args(rest, line_num, "EXPOSE requires a port")?;
    Ok(Instruction::Expose {
        ports: shell_words(rest),
    })
}

fn parse_label(rest: &str, line_num: usize) -> Result<Instruction> {
    require_args(rest, line_num, "LABEL requires key=value")?;
    Ok(Instruction::Label {
        pairs: parse_pairs(rest),
    })
}

fn parse_user(rest: &str, line_num: usize) -> Result<Instruction> {
    require_args(rest, line_num, "USER requires a username")?;
    Ok(Instruction::User {
        user: rest.split_whitespace().next().unwrap_or(rest).to_string(),
    })
}

fn parse_arg(rest: &str, line_num: usize) -> Result<Instruction> {
    require_args(rest, line_num, "ARG requires a name")?;

    if let Some(eq_pos) = rest.find('=') {
        let name = rest[..eq_pos].trim().to_string();
        let default = Some(unquote(&rest[eq_pos + 1..]));
        Ok(Instruction::Arg { name, default })
    } else {
        Ok(Instruction::Arg {
            name: rest.trim().to_string(),
            default: None,
        })
    }
}

fn parse_volume(rest: &str, line_num: usize) -> Result<Instruction> {
    require_args(rest, line_num, "VOLUME requires a path")?;
    let paths = if rest.starts_with('[') {
        parse_json_array(rest, line_num)?
    } else {
        shell_words(rest)
    };
    Ok(Instruction::Volume { paths })
}

// --- Helpers ---

/// Parse a JSON array string like `["a", "b", "c"]` into a Vec<String>.
fn parse_json_array(s: &str, line_num: usize) -> Result<Vec<String>> {
    let parsed: Vec<String> = serde_json::from_str(s).map_err(|e| {
        FitError::ParseError(format!(
            "Line {}: Invalid JSON array '{}': {}",
            line_num, s, e
        ))
    })?;
    Ok(parsed)
}

/// Remove surrounding quotes from a string.
fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Whitespace split that keeps quoted runs together and drops the quotes.
///
/// `a="b c" d` → `["a=b c", "d"]`. A backslash escapes the next character
/// outside single quotes.
pub(crate) fn shell_words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        match (c, quote) {
            ('\\', q) if q != Some('\'') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    in_word = true;
                }
            }
            ('"', None) | ('\'', None) => {
                quote = Some(c);
                in_word = true;
            }
            (c, Some(q)) if c == q => quote = None,
            (c, None) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (c, _) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if in_word {
        words.push(current);
    }
    words
}
