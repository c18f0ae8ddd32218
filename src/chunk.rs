//! Splits normalized content into ordered chunks that each fit a model's safe
//! input size without cutting through a logical record.
//!
//! Logical units are markdown sections: a heading together with the
//! blank-line separated blocks below it. A section that is too large is split
//! by its subsections, then by its blocks. A block that is too large on its own
//! is broken into lines; a markdown table is broken into rows and its header is
//! repeated at the top of every piece. A single unit that still exceeds the
//! limit becomes an oversized chunk of its own.

use crate::normalize::{ContentKind, NormalizedContent};

/// Splits content into chunks of at most `max_chars` bytes where possible.
///
/// Content that already fits is returned as a single chunk equal to the input.
pub fn split_into_chunks(content: &NormalizedContent, max_chars: usize) -> Vec<String> {
    let text = content.text.as_str();
    if text.len() <= max_chars || max_chars == 0 {
        return vec![text.to_string()];
    }

    let units = match content.kind {
        ContentKind::Table => table_units(text, max_chars),
        ContentKind::Markdown | ContentKind::Instruction => markdown_units(text, max_chars),
    };

    pack(units, max_chars)
}

/// A piece that must not be split further, with the separator that joins it
/// to the previous piece of the same chunk.
struct Unit {
    text: String,
    separator: &'static str,
}

fn markdown_units(text: &str, max_chars: usize) -> Vec<Unit> {
    section_units(blocks(text), max_chars)
}

/// Keeps each heading with the blocks below it, up to the next heading of the
/// same or a higher level. A section over the limit is split by its
/// subsections and blocks, and its heading stays with the first piece.
fn section_units(blocks: Vec<String>, max_chars: usize) -> Vec<Unit> {
    let mut units = Vec::new();

    for section in sections(blocks) {
        let joined = section.join("\n\n");
        if joined.len() <= max_chars {
            units.push(Unit {
                text: joined,
                separator: "\n\n",
            });
            continue;
        }

        let Some((first, rest)) = section.split_first() else {
            continue;
        };
        if heading_level(first).is_none() || rest.is_empty() {
            units.extend(section.into_iter().flat_map(|block| block_units(block, max_chars)));
            continue;
        }

        let mut body = section_units(rest.to_vec(), max_chars);
        if let Some(unit) = body.first_mut() {
            unit.text = format!("{first}\n\n{}", unit.text);
        }
        units.extend(body);
    }

    units
}

/// Groups blocks into top-level sections. Blocks before the first heading
/// form sections of their own.
fn sections(blocks: Vec<String>) -> Vec<Vec<String>> {
    let mut sections: Vec<Vec<String>> = Vec::new();
    let mut open_level: Option<usize> = None;

    for block in blocks {
        let level = heading_level(&block);
        match (open_level, level) {
            (Some(open), Some(level)) if level > open => {
                if let Some(section) = sections.last_mut() {
                    section.push(block);
                }
            }
            (Some(_), None) => {
                if let Some(section) = sections.last_mut() {
                    section.push(block);
                }
            }
            (_, level) => {
                open_level = level;
                sections.push(vec![block]);
            }
        }
    }

    sections
}

/// Level of a markdown ATX heading starting the block.
fn heading_level(block: &str) -> Option<usize> {
    let line = block.lines().next()?.trim_start();
    let level = line.chars().take_while(|c| *c == '#').count();
    let rest = line.get(level..)?;
    ((1..=6).contains(&level) && (rest.is_empty() || rest.starts_with(' '))).then_some(level)
}

fn block_units(block: String, max_chars: usize) -> Vec<Unit> {
    if block.len() <= max_chars {
        vec![Unit {
            text: block,
            separator: "\n\n",
        }]
    } else if is_table(&block) {
        table_units(&block, max_chars)
    } else {
        block
            .lines()
            .enumerate()
            .map(|(index, line)| Unit {
                text: line.to_string(),
                separator: if index == 0 { "\n\n" } else { "\n" },
            })
            .collect()
    }
}

/// Breaks a table into row groups, each prefixed with the header and separator
/// rows so every piece remains a valid table on its own.
fn table_units(text: &str, max_chars: usize) -> Vec<Unit> {
    let mut lines = text.lines();
    let header = match (lines.next(), lines.next()) {
        (Some(head), Some(rule)) => format!("{head}\n{rule}"),
        (Some(head), None) => head.to_string(),
        _ => return Vec::new(),
    };

    let mut units = Vec::new();
    let mut current = header.clone();
    let mut has_rows = false;

    for row in lines {
        if has_rows && current.len() + 1 + row.len() > max_chars {
            units.push(Unit {
                text: std::mem::replace(&mut current, header.clone()),
                separator: "\n\n",
            });
        }
        current.push('\n');
        current.push_str(row);
        has_rows = true;
    }

    units.push(Unit {
        text: current,
        separator: "\n\n",
    });
    units
}

/// Greedily packs units into chunks, keeping their order.
fn pack(units: Vec<Unit>, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for unit in units {
        if !current.is_empty() && current.len() + unit.separator.len() + unit.text.len() > max_chars
        {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str(unit.separator);
        }
        current.push_str(&unit.text);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Blank-line separated blocks, trimmed, empty ones skipped.
fn blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }

    blocks
}

fn is_table(block: &str) -> bool {
    let mut lines = block.lines();
    match (lines.next(), lines.next()) {
        (Some(head), Some(rule)) => {
            head.trim_start().starts_with('|')
                && rule
                    .trim()
                    .chars()
                    .all(|c| matches!(c, '|' | '-' | ':' | ' '))
        }
        _ => false,
    }
}
