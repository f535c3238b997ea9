//! Graphviz output.
//!
//! The graph is written as DOT text. Other formats are produced by piping the
//! DOT text through the Graphviz `dot` program.

use std::collections::HashSet;
use std::fmt::{self, Write as _};
use std::io::Write;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::thread;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use shakmaty::Color;
use tracing::debug;

use crate::error::RenderError;
use crate::graph::{ExplorationEdge, ExplorationNode, Graph};
use crate::position::{chess_from_epd, unicode_board};
use crate::position_key::PositionKey;

/// Page showing the database entry of a position.
const QUERY_PAGE_URL: &str = "https://www.chessdb.cn/queryc_en/?";

/// Characters kept verbatim in query page links.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const GRAPHVIZ_PROGRAM: &str = "dot";

/// Output format of the rendered graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Dot,
    Svg,
    Png,
    Pdf,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Dot => "dot",
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
            OutputFormat::Pdf => "pdf",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dot" | "gv" => Ok(OutputFormat::Dot),
            "svg" => Ok(OutputFormat::Svg),
            "png" => Ok(OutputFormat::Png),
            "pdf" => Ok(OutputFormat::Pdf),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Escapes text for use inside a double-quoted DOT string.
///
/// Newlines become the `\n` escape, which Graphviz renders as a centered line
/// break in labels and a plain line break in tooltips.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

fn color_of(side: Color) -> &'static str {
    match side {
        Color::White => "gold",
        Color::Black => "burlywood4",
    }
}

fn query_url(epd: &str) -> String {
    format!("{QUERY_PAGE_URL}{}", utf8_percent_encode(epd, QUERY_ENCODE_SET))
}

fn write_node(out: &mut String, node: &ExplorationNode) -> fmt::Result {
    let board = if node.show_board {
        chess_from_epd(&node.epd).map(|chess| unicode_board(&chess))
    } else {
        None
    };

    write!(out, "  \"{}\" [", escape(node.key.as_str()))?;
    match board {
        Some(board) => write!(out, "fontname=\"Courier\", label=\"{}\"", escape(&board))?,
        None => {
            let label = node
                .display_score
                .map_or_else(|| "?".to_string(), |score| score.to_string());
            write!(out, "label=\"{label}\"")?;
        }
    }
    writeln!(
        out,
        ", color={}, shape=box, penwidth={}, URL=\"{}\", tooltip=\"{}\"]",
        color_of(node.side_to_move),
        if node.is_pv { 3 } else { 1 },
        escape(&query_url(&node.epd)),
        escape(&node.tooltip),
    )
}

fn write_edge(out: &mut String, edge: &ExplorationEdge) -> fmt::Result {
    write!(
        out,
        "  \"{}\" -> \"{}\" [label=\"{}\", color={}",
        escape(edge.from.as_str()),
        escape(edge.to.as_str()),
        escape(&edge.san),
        color_of(edge.mover),
    )?;
    if edge.is_pv {
        out.push_str(", penwidth=3, fontname=\"Helvetica-Bold\"");
    } else {
        out.push_str(", penwidth=1, fontname=\"Helvetica\"");
    }
    if edge.is_late {
        out.push_str(", style=dashed");
    }
    writeln!(out, ", tooltip=\"{} {:+}\"]", escape(&edge.san), edge.score)
}

/// Writes the graph as a DOT `digraph`.
///
/// Edges may point at positions that were never explored because their depth
/// budget ran out; those get small plain-text stub nodes.
pub fn to_dot(graph: &Graph) -> String {
    let mut out = String::with_capacity(256 * (graph.nodes.len() + graph.edges.len()) + 64);

    // Writing into a String cannot fail.
    let _ = write_graph(&mut out, graph);
    out
}

fn write_graph(out: &mut String, graph: &Graph) -> fmt::Result {
    writeln!(out, "digraph {{")?;

    let emitted: HashSet<&PositionKey> = graph.nodes.iter().map(|n| &n.key).collect();
    let mut stubs: HashSet<&PositionKey> = HashSet::new();

    for edge in &graph.edges {
        if !emitted.contains(&edge.to) && stubs.insert(&edge.to) {
            writeln!(
                out,
                "  \"{}\" [label=\"...\", shape=plaintext, fontsize=10]",
                escape(edge.to.as_str())
            )?;
        }
    }
    for edge in &graph.edges {
        write_edge(out, edge)?;
    }
    for node in &graph.nodes {
        write_node(out, node)?;
    }

    writeln!(out, "}}")
}

/// Pipes DOT text through Graphviz and returns the rendered bytes.
///
/// # Errors
///
/// Returns an error if `dot` cannot be started or exits unsuccessfully.
pub fn run_graphviz(dot: &str, format: OutputFormat) -> Result<Vec<u8>, RenderError> {
    let spawn_err = |source| RenderError::Spawn {
        program: GRAPHVIZ_PROGRAM.to_string(),
        source,
    };

    let mut child = Command::new(GRAPHVIZ_PROGRAM)
        .arg(format!("-T{}", format.extension()))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;
    debug!(format = %format, bytes = dot.len(), "running graphviz");

    // Feed stdin from another thread so a large output cannot block the pipe.
    let mut stdin = child.stdin.take().ok_or_else(|| {
        spawn_err(std::io::Error::other("failed to open graphviz stdin"))
    })?;
    let input = dot.to_string();
    let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));

    let output = child.wait_with_output()?;
    let write_result = writer
        .join()
        .unwrap_or_else(|_| Err(std::io::Error::other("graphviz writer thread panicked")));

    if !output.status.success() {
        return Err(RenderError::Graphviz {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    write_result?;
    Ok(output.stdout)
}

/// Writes `graph` to `out` in `format`.
///
/// # Errors
///
/// Returns an error if Graphviz fails or the output cannot be written.
pub fn render<W: Write>(graph: &Graph, format: OutputFormat, out: &mut W) -> Result<(), RenderError> {
    let dot = to_dot(graph);
    match format {
        OutputFormat::Dot => out.write_all(dot.as_bytes())?,
        _ => out.write_all(&run_graphviz(&dot, format)?)?,
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::GamePosition;

    fn node(key: &str, score: Option<i32>, show_board: bool) -> ExplorationNode {
        ExplorationNode {
            key: PositionKey::from(key),
            epd: GamePosition::default().epd(),
            side_to_move: Color::White,
            display_score: score,
            is_pv: true,
            show_board,
            ply: 0,
            tooltip: "line one\nline \"two\"".to_string(),
        }
    }

    fn edge(from: &str, to: &str, is_late: bool) -> ExplorationEdge {
        ExplorationEdge {
            from: PositionKey::from(from),
            to: PositionKey::from(to),
            uci: "e2e4".to_string(),
            san: "e4".to_string(),
            mover: Color::White,
            score: 30,
            is_pv: !is_late,
            is_late,
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"a "b" \c"#), r#"a \"b\" \\c"#);
        assert_eq!(escape("x\ny"), "x\\ny");
    }

    #[test]
    fn test_query_url() {
        assert_eq!(
            query_url("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -"),
            "https://www.chessdb.cn/queryc_en/?rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR%20w%20KQkq%20-"
        );
    }

    #[test]
    fn test_score_label_and_unknown() {
        let graph = Graph {
            nodes: vec![node("a", Some(-35), false), node("b", None, false)],
            edges: Vec::new(),
        };
        let dot = to_dot(&graph);
        assert!(dot.starts_with("digraph {\n"));
        assert!(dot.trim_end().ends_with('}'));
        assert!(dot.contains("\"a\" [label=\"-35\", color=gold, shape=box, penwidth=3"));
        assert!(dot.contains("\"b\" [label=\"?\""));
        assert!(dot.contains("tooltip=\"line one\\nline \\\"two\\\"\""));
    }

    #[test]
    fn test_board_label() {
        let graph = Graph {
            nodes: vec![node("root", Some(0), true)],
            edges: Vec::new(),
        };
        let dot = to_dot(&graph);
        assert!(dot.contains("fontname=\"Courier\", label=\"♜ ♞ ♝ ♛ ♚ ♝ ♞ ♜\\n"));
    }

    #[test]
    fn test_edges_and_stubs() {
        let graph = Graph {
            nodes: vec![node("child", Some(10), false), node("root", Some(30), true)],
            edges: vec![
                edge("root", "child", false),
                edge("root", "unexplored", true),
                edge("child", "unexplored", true),
            ],
        };
        let dot = to_dot(&graph);

        assert_eq!(dot.matches("\"unexplored\" [label=\"...\", shape=plaintext").count(), 1);
        assert!(dot.contains(
            "\"root\" -> \"child\" [label=\"e4\", color=gold, penwidth=3, fontname=\"Helvetica-Bold\", tooltip=\"e4 +30\"]"
        ));
        assert!(dot.contains("\"root\" -> \"unexplored\" [label=\"e4\", color=gold, penwidth=1, fontname=\"Helvetica\", style=dashed"));
    }

    #[test]
    fn test_render_dot_passthrough() {
        let graph = Graph {
            nodes: vec![node("root", Some(0), false)],
            edges: Vec::new(),
        };
        let mut out = Vec::new();
        render(&graph, OutputFormat::Dot, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), to_dot(&graph));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("SVG".parse::<OutputFormat>(), Ok(OutputFormat::Svg));
        assert!("jpeg2000".parse::<OutputFormat>().is_err());
    }
}
