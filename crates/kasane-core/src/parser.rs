use crate::layout::Layout;
use crate::names;
use crate::types::{CompositeOp, Keycode, LayerId, Modifier};
use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use tracing::debug;

/// Loads a layout description from disk. Files are UTF-8.
pub fn load_layout<P: AsRef<Path>>(path: P) -> Result<Layout> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("reading layout {}", path.as_ref().display()))?;
    parse_layout_content(&content)
}

pub fn parse_layout_content(content: &str) -> Result<Layout> {
    parse_layout_content_with(content, &[])
}

/// Parses the line-oriented layout format:
///
/// ```text
/// ; layout name
/// [base]
/// tab, q, w, ...
/// ctl_t(esc), a, r, ...
/// [lower]
/// ____, 1, 2, ...
/// ```
///
/// `;` starts a comment (the first one names the layout), `[name]` opens a
/// layer, rows are comma-separated cell tokens. Layer declaration order
/// assigns ids. Composite-action definitions are code, not text; callers
/// attach them here.
pub fn parse_layout_content_with(
    content: &str,
    composites: &[(u16, CompositeOp)],
) -> Result<Layout> {
    let mut name: Option<String> = None;
    let mut sections: Vec<(String, Vec<Vec<String>>)> = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix(';') {
            if name.is_none() && sections.is_empty() {
                let trimmed = comment.trim();
                if !trimmed.is_empty() {
                    name = Some(trimmed.to_string());
                }
            }
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            let section = line[1..line.len() - 1].trim();
            if section.is_empty() {
                bail!("line {}: empty layer name", idx + 1);
            }
            sections.push((section.to_string(), Vec::new()));
            continue;
        }
        let Some((_, rows)) = sections.last_mut() else {
            bail!("line {}: cell row before any [layer] header", idx + 1);
        };
        let cells = split_top_level(line)
            .into_iter()
            .map(|t| t.trim().to_string())
            .collect::<Vec<_>>();
        rows.push(cells);
    }

    if sections.is_empty() {
        bail!("layout has no [layer] sections");
    }

    let rows = sections[0].1.len();
    let cols = sections[0].1.first().map_or(0, Vec::len);
    if rows == 0 || cols == 0 {
        bail!("layer `{}` has no cells", sections[0].0);
    }
    debug!(layers = sections.len(), rows, cols, "parsed layout sections");

    let layer_names: Vec<String> = sections.iter().map(|(n, _)| n.clone()).collect();

    let mut builder = Layout::builder(rows as u8, cols as u8);
    if let Some(n) = name {
        builder = builder.name(n);
    }
    for (layer_name, raw_rows) in &sections {
        let mut grid = Vec::with_capacity(raw_rows.len());
        for tokens in raw_rows {
            let mut row = Vec::with_capacity(tokens.len());
            for token in tokens {
                let code = parse_token(token, &layer_names).with_context(|| {
                    format!("layer `{layer_name}`: cell `{token}`")
                })?;
                row.push(code);
            }
            grid.push(row);
        }
        builder = builder.layer(layer_name.clone(), grid);
    }
    for (id, op) in composites {
        builder = builder.composite(*id, op.clone());
    }
    builder.finish().map_err(Into::into)
}

/// Splits on commas that are not nested inside parentheses, so
/// `lt(nav,o), a` yields two cells.
fn split_top_level(line: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in line.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&line[start..]);
    out
}

fn parse_token(token: &str, layer_names: &[String]) -> Result<Keycode> {
    let token = token.trim();
    if token.is_empty() {
        bail!("empty cell");
    }
    if token.chars().all(|c| c == '_') {
        return Ok(Keycode::Transparent);
    }
    if token.chars().all(|c| c.eq_ignore_ascii_case(&'x')) {
        return Ok(Keycode::NoOp);
    }

    if let Some((head, args)) = split_call(token) {
        let head = head.to_ascii_lowercase();
        return match head.as_str() {
            "mo" => Ok(Keycode::MomentaryLayer(parse_layer(args, layer_names)?)),
            "df" => Ok(Keycode::DefaultLayer(parse_layer(args, layer_names)?)),
            "lt" => {
                let (layer, tap) = two_args(args)?;
                Ok(Keycode::LayerTap {
                    layer: parse_layer(layer, layer_names)?,
                    tap: parse_code(tap)?,
                })
            }
            "mt" => {
                let (modifier, tap) = two_args(args)?;
                Ok(Keycode::ModTap {
                    modifier: parse_modifier(modifier)?,
                    tap: parse_code(tap)?,
                })
            }
            "ctl_t" => Ok(Keycode::ModTap {
                modifier: Modifier::LCtrl,
                tap: parse_code(args)?,
            }),
            "sft_t" => Ok(Keycode::ModTap {
                modifier: Modifier::LShift,
                tap: parse_code(args)?,
            }),
            "alt_t" => Ok(Keycode::ModTap {
                modifier: Modifier::LAlt,
                tap: parse_code(args)?,
            }),
            "gui_t" => Ok(Keycode::ModTap {
                modifier: Modifier::LGui,
                tap: parse_code(args)?,
            }),
            "s" | "ctl" | "alt" | "gui" => Ok(Keycode::Plain(parse_code(token)?)),
            "act" => {
                let id: u16 = args
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("`{args}` is not a composite id"))?;
                Ok(Keycode::Composite(id))
            }
            _ => bail!("unknown key form `{head}`"),
        };
    }

    names::keycode_for(token).ok_or_else(|| anyhow!("unknown key name `{token}`"))
}

/// Splits `head(args)` into its parts, requiring the closing paren to end
/// the token.
fn split_call(token: &str) -> Option<(&str, &str)> {
    let open = token.find('(')?;
    if !token.ends_with(')') || open == 0 {
        return None;
    }
    Some((&token[..open], &token[open + 1..token.len() - 1]))
}

fn two_args(args: &str) -> Result<(&str, &str)> {
    let parts = split_top_level(args);
    if parts.len() != 2 {
        bail!("expected two arguments in `{args}`");
    }
    Ok((parts[0].trim(), parts[1].trim()))
}

fn parse_layer(arg: &str, layer_names: &[String]) -> Result<LayerId> {
    let arg = arg.trim();
    if let Ok(id) = arg.parse::<LayerId>() {
        return Ok(id);
    }
    layer_names
        .iter()
        .position(|n| n.eq_ignore_ascii_case(arg))
        .map(|i| i as LayerId)
        .ok_or_else(|| anyhow!("unknown layer `{arg}`"))
}

fn parse_modifier(arg: &str) -> Result<Modifier> {
    match names::keycode_for(arg) {
        Some(Keycode::Modifier(m)) => Ok(m),
        _ => bail!("`{arg}` is not a modifier"),
    }
}

/// Output code expression: a bare name or nested chord wrappers, e.g.
/// `s(alt(mins))`.
fn parse_code(token: &str) -> Result<u16> {
    let token = token.trim();
    if let Some((head, args)) = split_call(token) {
        let inner = parse_code(args)?;
        return match head.to_ascii_lowercase().as_str() {
            "s" => Ok(names::s(inner)),
            "ctl" => Ok(names::ctl(inner)),
            "alt" => Ok(names::alt(inner)),
            "gui" => Ok(names::gui(inner)),
            _ => bail!("`{head}` cannot wrap an output code"),
        };
    }
    names::plain_code_for(token).ok_or_else(|| anyhow!("unknown key name `{token}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::code;
    use crate::types::MatrixPos;

    #[test]
    fn test_minimal_layout() {
        let layout = parse_layout_content(
            "; tiny\n\
             [base]\n\
             a, b\n\
             c, d\n",
        )
        .expect("parse");
        assert_eq!(layout.name(), Some("tiny"));
        assert_eq!(layout.rows(), 2);
        assert_eq!(layout.cols(), 2);
        assert_eq!(layout.cell(0, MatrixPos::new(1, 0)), Keycode::Plain(code::C));
    }

    #[test]
    fn test_sentinels_and_layer_refs() {
        let layout = parse_layout_content(
            "[base]\n\
             a, mo(fn), lt(fn,o)\n\
             [fn]\n\
             _______, xxxx, 1\n",
        )
        .expect("parse");
        assert_eq!(layout.cell(0, MatrixPos::new(0, 1)), Keycode::MomentaryLayer(1));
        assert_eq!(
            layout.cell(0, MatrixPos::new(0, 2)),
            Keycode::LayerTap { layer: 1, tap: code::O }
        );
        assert_eq!(layout.cell(1, MatrixPos::new(0, 0)), Keycode::Transparent);
        assert_eq!(layout.cell(1, MatrixPos::new(0, 1)), Keycode::NoOp);
    }

    #[test]
    fn test_dual_role_and_chords() {
        let layout = parse_layout_content(
            "[base]\n\
             ctl_t(esc), mt(rsft, ent), s(alt(mins)), gui(grv)\n",
        )
        .expect("parse");
        assert_eq!(
            layout.cell(0, MatrixPos::new(0, 0)),
            Keycode::ModTap { modifier: Modifier::LCtrl, tap: code::ESC }
        );
        assert_eq!(
            layout.cell(0, MatrixPos::new(0, 1)),
            Keycode::ModTap { modifier: Modifier::RShift, tap: code::ENT }
        );
        assert_eq!(
            layout.cell(0, MatrixPos::new(0, 2)),
            Keycode::Plain(names::s(names::alt(code::MINS)))
        );
        assert_eq!(
            layout.cell(0, MatrixPos::new(0, 3)),
            Keycode::Plain(names::gui(code::GRV))
        );
    }

    #[test]
    fn test_unknown_name_is_an_error() {
        let err = parse_layout_content("[base]\nquux\n").unwrap_err();
        assert!(err.to_string().contains("cell `quux`"));
    }

    #[test]
    fn test_row_before_header_is_an_error() {
        assert!(parse_layout_content("a, b\n").is_err());
    }

    #[test]
    fn test_transparent_default_rejected_at_parse() {
        // Validation runs as part of building the layout.
        assert!(parse_layout_content("[base]\na, ____\n").is_err());
    }

    #[test]
    fn test_composites_attached() {
        let layout = parse_layout_content_with(
            "[base]\nact(0)\n",
            &[(
                0,
                CompositeOp::FeedbackHold {
                    modifier: Modifier::RShift,
                    notify: crate::types::FeedbackKind::BacklightStep,
                },
            )],
        )
        .expect("parse");
        assert!(layout.composite(0).is_some());
        assert_eq!(layout.cell(0, MatrixPos::new(0, 0)), Keycode::Composite(0));
    }
}
