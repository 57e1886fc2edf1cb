//! Human-readable rendering of a chunk tree

use crate::chunk::ChunkNode;

/// Render `root` and its descendants, one chunk per line, children indented
/// by two spaces.
///
/// ```text
/// RIFF 'WAVE' group @0 size=48
///   fmt  value @12 size=2
/// ```
pub fn format_tree(root: &dyn ChunkNode) -> String {
    let mut lines = Vec::new();
    collect_lines(root, 0, &mut lines);
    lines.join("\n")
}

fn collect_lines(node: &dyn ChunkNode, depth: usize, lines: &mut Vec<String>) {
    let mut line = format!("{:indent$}{}", "", node.id(), indent = depth * 2);
    if let Some(form_type) = node.form_type() {
        line.push_str(&format!(" '{}'", form_type));
    }
    line.push_str(&format!(
        " {} @{} size={}",
        node.kind_name(),
        node.start_location(),
        node.data_byte_size()
    ));
    if node.padding_bytes() > 0 {
        line.push_str(" pad=1");
    }
    if node.is_extended_size() {
        line.push_str(" extended");
    }
    if node.header_dirty() {
        line.push_str(" dirty");
    }
    lines.push(line);

    for child in node.children() {
        collect_lines(child.as_ref(), depth + 1, lines);
    }
}
