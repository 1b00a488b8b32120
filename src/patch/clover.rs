/// Branch overlay for Clover XML summaries.
///
/// Clover XML structure (as written by PHP_CodeCoverage):
///
///   <coverage generated="...">
///     <project timestamp="...">
///       <package name="...">                      (optional)
///         <file name="/absolute/path/to/A.php">
///           <class name="A"><metrics .../></class>
///           <line num="3" type="method" name="m" count="1"/>
///           <line num="10" type="stmt" count="1"/>
///           <metrics loc="..." statements="..." .../>
///         </file>
///       </package>
///       <metrics files="..." .../>
///     </project>
///   </coverage>
///
/// What gets rewritten:
///   - the `<metrics>` child of every `<file>` gets `branches` and
///     `coveredbranch` for that file; a `<file>` without a metrics child
///     carries them itself;
///   - the `<metrics>` child of `<project>` gets the sum over every file
///     present in the report;
///   - every existing `<line>` of a file is annotated with `branch`, and
///     `coveredbranch`/`branchcount` when branches start on it (see
///     [`crate::annotate`]). No line is ever added.
///
/// The document is streamed twice: once to learn which nodes own a metrics
/// child and which files are present, once to rewrite. Everything that is
/// not rewritten passes through byte for byte.
use std::borrow::Cow;
use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::aggregate;
use crate::annotate::{annotate_line, line_aggregates, LineBranch};
use crate::dataset::BranchDataset;
use crate::error::{BranchCovError, Result};
use crate::model::{Aggregate, LineAggregate};

/// Attribute carrying the number of branches on file/project metrics.
pub const ATTR_BRANCHES: &str = "branches";
/// Attribute carrying the number of hit branches.
pub const ATTR_COVERED: &str = "coveredbranch";
/// Line attribute: whether branches start on this line.
pub const ATTR_BRANCH: &str = "branch";
/// Line attribute: number of branches starting on this line.
pub const ATTR_BRANCH_COUNT: &str = "branchcount";

/// Shape of the report learned by the first pass, in document order.
#[derive(Debug, Default)]
struct Layout {
    /// `(file key, has metrics child)` per `<file>` node.
    files: Vec<(String, bool)>,
    /// Whether each `<project>` node has a metrics child.
    projects: Vec<bool>,
}

/// State of the `<file>` currently being rewritten.
struct OpenFile {
    lines: BTreeMap<u32, LineAggregate>,
    total: Aggregate,
    has_metrics: bool,
}

/// Rewrite a Clover document with the branch counts of `dataset`.
pub fn patch_machine_summary(input: &[u8], dataset: &BranchDataset) -> Result<Vec<u8>> {
    let counts = aggregate::branch_counts(dataset);
    let layout = scan(input)?;
    let project_total: Aggregate = layout
        .files
        .iter()
        .map(|(key, _)| aggregate::file_total(&counts, key))
        .sum();

    let mut reader = Reader::from_reader(input);
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(input.len()));
    let mut buf = Vec::new();

    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut file_index = 0;
    let mut project_index = 0;
    let mut project_has_metrics = false;
    let mut current: Option<OpenFile> = None;

    loop {
        let event = reader.read_event_into(&mut buf);
        let is_start = matches!(&event, Ok(Event::Start(_)));
        match event {
            Err(e) => return Err(xml_err(e, &reader)),
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let parent = stack.last().map(Vec::as_slice);
                let rewritten = match e.name().as_ref() {
                    b"project" => {
                        project_has_metrics = layout.projects.get(project_index).copied().unwrap_or(false);
                        project_index += 1;
                        if project_has_metrics {
                            None
                        } else {
                            Some(with_totals(e, project_total))
                        }
                    }
                    b"file" => {
                        let (key, has_metrics) = layout
                            .files
                            .get(file_index)
                            .cloned()
                            .unwrap_or_else(|| (file_key(e), false));
                        file_index += 1;
                        let file = OpenFile {
                            lines: dataset.get(&key).map(line_aggregates).unwrap_or_default(),
                            total: aggregate::file_total(&counts, &key),
                            has_metrics,
                        };
                        let rewritten = (!file.has_metrics).then(|| with_totals(e, file.total));
                        if is_start {
                            current = Some(file);
                        }
                        rewritten
                    }
                    b"metrics" => match parent {
                        Some(b"file") => current.as_ref().map(|f| with_totals(e, f.total)),
                        Some(b"project") if project_has_metrics => Some(with_totals(e, project_total)),
                        _ => None,
                    },
                    b"line" => current.as_ref().and_then(|f| annotate_line_node(e, &f.lines)),
                    _ => None,
                };

                if is_start {
                    stack.push(e.name().as_ref().to_vec());
                }
                let result = match rewritten {
                    Some(elem) if is_start => writer.write_event(Event::Start(elem)),
                    Some(elem) => writer.write_event(Event::Empty(elem)),
                    None if is_start => writer.write_event(Event::Start(e.clone())),
                    None => writer.write_event(Event::Empty(e.clone())),
                };
                result.map_err(|err| xml_err(err, &reader))?;
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"file" {
                    current = None;
                }
                stack.pop();
                writer
                    .write_event(Event::End(e))
                    .map_err(|err| xml_err(err, &reader))?;
            }
            Ok(other) => {
                writer
                    .write_event(other)
                    .map_err(|err| xml_err(err, &reader))?;
            }
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// Source paths of every `<file>` node, in document order.
pub fn file_keys(input: &[u8]) -> Result<Vec<String>> {
    Ok(scan(input)?.files.into_iter().map(|(key, _)| key).collect())
}

/// First pass: file keys and which nodes own a direct metrics child.
fn scan(input: &[u8]) -> Result<Layout> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut layout = Layout::default();

    loop {
        let event = reader.read_event_into(&mut buf);
        let is_start = matches!(&event, Ok(Event::Start(_)));
        match event {
            Err(e) => return Err(xml_err(e, &reader)),
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match e.name().as_ref() {
                    b"file" => layout.files.push((file_key(e), false)),
                    b"project" => layout.projects.push(false),
                    b"metrics" => match stack.last().map(Vec::as_slice) {
                        Some(b"file") => {
                            if let Some(file) = layout.files.last_mut() {
                                file.1 = true;
                            }
                        }
                        Some(b"project") => {
                            if let Some(project) = layout.projects.last_mut() {
                                *project = true;
                            }
                        }
                        _ => {}
                    },
                    _ => {}
                }
                if is_start {
                    stack.push(e.name().as_ref().to_vec());
                }
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(layout)
}

/// Annotate one `<line>` node. `None` when nothing changes.
fn annotate_line_node(
    e: &BytesStart<'_>,
    lines: &BTreeMap<u32, LineAggregate>,
) -> Option<BytesStart<'static>> {
    let num = get_attr(e, b"num").and_then(|v| v.trim().parse::<u32>().ok());
    let mut branch = LineBranch {
        marker: get_attr(e, ATTR_BRANCH.as_bytes())
            .filter(|v| !v.is_empty())
            .map(|v| v == "true"),
        covered: get_attr(e, ATTR_COVERED.as_bytes()).and_then(|v| v.trim().parse().ok()),
        count: get_attr(e, ATTR_BRANCH_COUNT.as_bytes()).and_then(|v| v.trim().parse().ok()),
    };

    if !annotate_line(&mut branch, num.and_then(|n| lines.get(&n))) {
        return None;
    }

    let mut updates = Vec::with_capacity(3);
    if let Some(marker) = branch.marker {
        updates.push((ATTR_BRANCH, marker.to_string()));
    }
    if let Some(covered) = branch.covered {
        updates.push((ATTR_COVERED, covered.to_string()));
    }
    if let Some(count) = branch.count {
        updates.push((ATTR_BRANCH_COUNT, count.to_string()));
    }
    Some(set_attributes(e, &updates))
}

fn with_totals(e: &BytesStart<'_>, total: Aggregate) -> BytesStart<'static> {
    set_attributes(
        e,
        &[
            (ATTR_BRANCHES, total.branch_count.to_string()),
            (ATTR_COVERED, total.hit_count.to_string()),
        ],
    )
}

/// Copy `e`, replacing the value of attributes named in `updates` in place
/// and appending the ones it lacks, in `updates` order.
fn set_attributes(e: &BytesStart<'_>, updates: &[(&str, String)]) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    let mut seen = vec![false; updates.len()];

    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        match updates.iter().position(|(k, _)| *k == key) {
            Some(i) if !seen[i] => {
                seen[i] = true;
                out.push_attribute((key.as_str(), updates[i].1.as_str()));
            }
            // Duplicate of an attribute already written: drop it.
            Some(_) => {}
            None => {
                let value = attr
                    .unescape_value()
                    .unwrap_or_else(|_| Cow::Owned(String::from_utf8_lossy(&attr.value).into_owned()));
                out.push_attribute((key.as_str(), value.as_ref()));
            }
        }
    }
    for (i, (key, value)) in updates.iter().enumerate() {
        if !seen[i] {
            out.push_attribute((*key, value.as_str()));
        }
    }
    out
}

/// Prefer `path` (absolute) over `name`, like the Clover readers do.
fn file_key(e: &BytesStart<'_>) -> String {
    get_attr(e, b"path")
        .or_else(|| get_attr(e, b"name"))
        .unwrap_or_default()
}

fn get_attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn xml_err(source: quick_xml::Error, reader: &Reader<&[u8]>) -> BranchCovError {
    BranchCovError::Xml {
        source,
        position: reader.buffer_position(),
    }
}
