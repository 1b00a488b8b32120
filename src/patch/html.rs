/// Branch overlay for the rendered HTML pages.
///
/// Both file pages and directory index pages carry one coverage table:
///
///   <table class="table table-bordered">
///     <thead>
///       <tr><td>&nbsp;</td><td colspan="10">...Code Coverage...</td></tr>
///       <tr><td>&nbsp;</td><td colspan="3">...Lines...</td>...</tr>
///     </thead>
///     <tbody>
///       <tr><td class="success">Total</td>...</tr>
///       <tr><td class="danger"><a href="#7">Foo</a></td>...</tr>
///       <tr><td class="danger">&nbsp;<a href="#9">bar</a></td>...</tr>
///     </tbody>
///   </table>
///
/// The header gains a three-column "Branches" group and every body row gains
/// a badge (see [`crate::badge`]). Rows are identified by the text of their
/// first cell. On file pages a row whose label is indented with `&nbsp;`
/// lists a method of the class row above it.
///
/// Every appended cell carries [`MARKER_ATTR`]. Patching first removes any
/// previously appended cells, so a page patched twice with the same counts is
/// byte-identical to a page patched once.
use std::borrow::Cow;
use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::aggregate::{self, Counts, METHOD_SEPARATOR, TOTAL_LABEL};
use crate::badge::{Badge, MARKER_ATTR};
use crate::model::Aggregate;
use crate::tree::TreeNode;

/// Extra columns taken by the "Branches" group.
const BRANCH_COLUMNS: u32 = 3;

static TABLE_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<table\b[^>]*\btable-bordered\b[^>]*>").unwrap());
static TABLE_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)</table\s*>").unwrap());
static THEAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<thead\b[^>]*>(.*?)</thead\s*>").unwrap());
static TBODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tbody\b[^>]*>(.*?)</tbody\s*>").unwrap());
static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)(<tr\b[^>]*>)(.*?)(</tr\s*>)").unwrap());
static CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td\b([^>]*)>(.*?)</td\s*>").unwrap());
static MARKED_CELL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<td\b[^>]*\bdata-coverage="branch"[^>]*>.*?</td\s*>"#).unwrap()
});
static COLSPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bcolspan="(\d+)""#).unwrap());
static BREADCRUMB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<ol\b[^>]*\bbreadcrumb\b[^>]*>\s*<li\b[^>]*>(.*?)</li\s*>").unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*/\s*(\d+)\s*$").unwrap());

/// First cell of a body row, as the patcher sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLabel {
    /// Visible text, entities decoded and trimmed.
    pub text: String,
    /// Whether the text was indented with `&nbsp;` (a method row).
    pub indented: bool,
}

impl RowLabel {
    fn from_cell(inner: &str) -> Self {
        let raw = TAG_RE.replace_all(inner, "");
        let raw = raw.trim_start();
        Self {
            indented: raw.starts_with("&nbsp;"),
            text: decode_entities(raw).trim().to_string(),
        }
    }

    pub fn is_total(&self) -> bool {
        self.text == TOTAL_LABEL
    }
}

/// Patch a file page with the counts of `file`. Returns `None` when the page
/// has no coverage table.
#[must_use]
pub fn patch_file_artifact(html: &str, counts: &Counts, file: &str) -> Option<String> {
    let mut owner: Option<String> = None;
    patch_table(html, |label| {
        if label.is_total() {
            return aggregate::file_total(counts, file);
        }
        if !label.indented {
            owner = Some(label.text.clone());
            return aggregate::label_total(counts, file, &label.text);
        }
        // Indented rows are methods of the row above; a method with no
        // recorded branches must not pick up a same-named free function.
        match owner.as_deref() {
            Some(class) => {
                let qualified = format!("{class}{METHOD_SEPARATOR}{}", label.text);
                counts
                    .get(file)
                    .and_then(|f| f.get(&qualified))
                    .copied()
                    .unwrap_or_default()
            }
            None => aggregate::label_total(counts, file, &label.text),
        }
    })
}

/// Patch a directory index page with the aggregates of `node` and its
/// children. Returns `None` when the page has no coverage table.
#[must_use]
pub fn patch_directory_artifact(html: &str, node: &TreeNode) -> Option<String> {
    patch_table(html, |label| {
        if label.is_total() {
            return node.aggregate();
        }
        node.child(&label.text)
            .filter(|child| child.is_directory())
            .or_else(|| node.child(&format!("{}.html", label.text)))
            .map(TreeNode::aggregate)
            .unwrap_or_default()
    })
}

/// Read back the branch counts of a page's `Total` row. `None` when the page
/// has no table, no `Total` row, or no parseable branch cells.
#[must_use]
pub fn read_total(html: &str) -> Option<Aggregate> {
    let table = table_range(html)?;
    let body = TBODY_RE.captures(&html[table])?;
    ROW_RE.captures_iter(body.get(1)?.as_str()).find_map(|row| {
        let inner = row.get(2)?.as_str();
        let first = CELL_RE.captures(inner)?;
        if !RowLabel::from_cell(first.get(2)?.as_str()).is_total() {
            return None;
        }
        let last = MARKED_CELL_RE.find_iter(inner).last()?;
        let text = decode_entities(&TAG_RE.replace_all(last.as_str(), ""));
        let caps = COUNT_RE.captures(&text)?;
        let hit = caps[1].parse().ok()?;
        let total = caps[2].parse().ok()?;
        Some(Aggregate::new(hit, total))
    })
}

/// Text of the first breadcrumb entry, which on a report's root index page
/// is the source directory the report was rendered for.
#[must_use]
pub fn breadcrumb_root(html: &str) -> Option<String> {
    let caps = BREADCRUMB_RE.captures(html)?;
    let text = decode_entities(&TAG_RE.replace_all(&caps[1], ""));
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Rewrite the header and every body row of the coverage table, asking
/// `aggregate_for` for the counts of each row in document order.
fn patch_table(html: &str, mut aggregate_for: impl FnMut(&RowLabel) -> Aggregate) -> Option<String> {
    let table = table_range(html)?;
    let head = section_range(&THEAD_RE, html, &table)?;
    let body = section_range(&TBODY_RE, html, &table)?;

    let new_body = ROW_RE.replace_all(&html[body.clone()], |caps: &Captures| {
        let inner = MARKED_CELL_RE.replace_all(&caps[2], "");
        let Some(first) = CELL_RE.captures(&inner) else {
            return caps[0].to_string();
        };
        let label = RowLabel::from_cell(&first[2]);
        let badge = Badge::from(aggregate_for(&label));
        format!("{}{}{}{}", &caps[1], inner, badge.fragment(), &caps[3])
    });
    let new_head = patch_header(&html[head.clone()]);

    // Splice back to front so earlier ranges stay valid.
    let mut out = html.to_string();
    let (first, second) = if head.start < body.start {
        ((head, new_head), (body, new_body))
    } else {
        ((body, new_body), (head, new_head))
    };
    out.replace_range(second.0, &second.1);
    out.replace_range(first.0, &first.1);
    Some(out)
}

/// Widen the "Code Coverage" cell and append the "Branches" group to the
/// last header row. The widening only happens the first time.
fn patch_header(head: &str) -> Cow<'_, str> {
    let already_patched = MARKED_CELL_RE.is_match(head);
    let rows = ROW_RE.find_iter(head).count();
    if rows == 0 {
        return Cow::Borrowed(head);
    }

    let mut index = 0;
    let patched = ROW_RE.replace_all(head, |caps: &Captures| {
        let mut inner = MARKED_CELL_RE.replace_all(&caps[2], "").into_owned();
        if index == 0 && !already_patched {
            inner = widen_title_cell(&inner);
        }
        if index + 1 == rows {
            inner.push_str(&format!(
                r#"<td colspan="{BRANCH_COLUMNS}" {MARKER_ATTR}><div align="center"><strong>Branches</strong></div></td>"#
            ));
        }
        index += 1;
        format!("{}{}{}", &caps[1], inner, &caps[3])
    });
    Cow::Owned(patched.into_owned())
}

/// Add [`BRANCH_COLUMNS`] to the colspan of the "Code Coverage" cell, or of
/// the last spanning cell when no cell has that title.
fn widen_title_cell(row: &str) -> String {
    let spanning: Vec<_> = CELL_RE
        .captures_iter(row)
        .filter(|c| COLSPAN_RE.is_match(&c[1]))
        .collect();
    let target = spanning
        .iter()
        .find(|c| c[2].contains("Code Coverage"))
        .or_else(|| spanning.last());
    let Some(cell) = target else {
        return row.to_string();
    };
    let Some(attrs) = cell.get(1) else {
        return row.to_string();
    };

    let widened = COLSPAN_RE.replace(attrs.as_str(), |c: &Captures| {
        let span: u32 = c[1].parse().unwrap_or(1);
        format!(r#"colspan="{}""#, span + BRANCH_COLUMNS)
    });
    let mut out = row.to_string();
    out.replace_range(attrs.range(), &widened);
    out
}

/// Byte range of the coverage table's content, between its tags.
fn table_range(html: &str) -> Option<Range<usize>> {
    let open = TABLE_OPEN_RE.find(html)?;
    let close = TABLE_CLOSE_RE.find_at(html, open.end())?;
    Some(open.end()..close.start())
}

/// Absolute byte range of a section's content inside `table`.
fn section_range(re: &Regex, html: &str, table: &Range<usize>) -> Option<Range<usize>> {
    let caps = re.captures(&html[table.clone()])?;
    let inner = caps.get(1)?;
    Some(table.start + inner.start()..table.start + inner.end())
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::branch_counts;
    use crate::dataset::{BranchDataset, DEFAULT_EXCLUDE};

    const FILE_PAGE: &str = r##"<html><body>
<div class="container">
 <table class="table table-bordered">
  <thead>
   <tr>
    <td>&nbsp;</td>
    <td colspan="10"><div align="center"><strong>Code Coverage</strong></div></td>
   </tr>
   <tr>
    <td>&nbsp;</td>
    <td colspan="3"><div align="center"><strong>Classes and Traits</strong></div></td>
   </tr>
  </thead>
  <tbody>
   <tr>
    <td class="">Total</td>
    <td class="success big">x</td>
   </tr>
   <tr>
    <td class="danger" colspan="4"><a href="#20"><abbr title="helper()">helper</abbr></a></td>
    <td class="danger big">x</td>
   </tr>
   <tr>
    <td class="danger"><span title="Foo"><a href="#3">Foo</a></span></td>
    <td class="danger big">x</td>
   </tr>
   <tr>
    <td class="danger">&nbsp;<a href="#5"><abbr title="bar()">bar</abbr></a></td>
    <td class="danger big">x</td>
   </tr>
  </tbody>
 </table>
</div>
</body></html>"##;

    fn counts() -> Counts {
        let input = br#"{
            "/src/A.php": {"functions": {
                "Foo->bar": {"branches": [{"line_start": 5, "hit": 1}, {"line_start": 6, "hit": 0}]},
                "Foo->baz": {"branches": [{"line_start": 9, "hit": 1}]},
                "helper": {"branches": [{"line_start": 21, "hit": 0}, {"line_start": 22, "hit": 0}]}
            }}
        }"#;
        branch_counts(&BranchDataset::from_slice(input, DEFAULT_EXCLUDE).unwrap())
    }

    fn row_with<'a>(html: &'a str, needle: &str) -> &'a str {
        ROW_RE
            .find_iter(html)
            .map(|m| m.as_str())
            .find(|row| row.contains(needle))
            .unwrap()
    }

    #[test]
    fn test_patch_file_header() {
        let out = patch_file_artifact(FILE_PAGE, &counts(), "/src/A.php").unwrap();
        assert!(out.contains(r#"<td colspan="13"><div align="center"><strong>Code Coverage"#));
        assert!(out.contains("<strong>Branches</strong>"));
        assert_eq!(out.matches("<strong>Branches</strong>").count(), 1);
    }

    #[test]
    fn test_patch_file_rows() {
        let out = patch_file_artifact(FILE_PAGE, &counts(), "/src/A.php").unwrap();

        let total = row_with(&out, ">Total<");
        assert!(total.contains("2&nbsp;/&nbsp;5"));
        assert!(total.contains(r#"class="danger small""#));

        let class = row_with(&out, r#"title="Foo""#);
        assert!(class.contains("2&nbsp;/&nbsp;3"));
        assert!(class.contains(">66.67%<"));

        let method = row_with(&out, "bar()");
        assert!(method.contains("1&nbsp;/&nbsp;2"));
        assert!(method.contains(r#"class="warning small""#));

        // A free function row, listed before the classes.
        let function = row_with(&out, "helper()");
        assert!(function.contains("0&nbsp;/&nbsp;2"));
    }

    #[test]
    fn test_unrecorded_method_does_not_borrow_function_counts() {
        let page = FILE_PAGE.replace(
            r##"<td class="danger">&nbsp;<a href="#5"><abbr title="bar()">bar</abbr></a></td>"##,
            r##"<td class="danger">&nbsp;<a href="#5"><abbr title="helper()">helper</abbr></a></td>"##,
        );
        let out = patch_file_artifact(&page, &counts(), "/src/A.php").unwrap();
        let rows: Vec<&str> = ROW_RE
            .find_iter(&out)
            .map(|m| m.as_str())
            .filter(|row| row.contains("helper()"))
            .collect();
        assert_eq!(rows.len(), 2);
        // The free function keeps its own counts; Foo->helper has none.
        assert!(rows[0].contains("0&nbsp;/&nbsp;2"));
        assert!(rows[1].contains("0&nbsp;/&nbsp;0"));
    }

    #[test]
    fn test_patch_file_is_idempotent() {
        let once = patch_file_artifact(FILE_PAGE, &counts(), "/src/A.php").unwrap();
        let twice = patch_file_artifact(&once, &counts(), "/src/A.php").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_repatch_replaces_previous_badges() {
        let once = patch_file_artifact(FILE_PAGE, &counts(), "/src/A.php").unwrap();
        let again = patch_file_artifact(&once, &Counts::new(), "/src/A.php").unwrap();
        let total = row_with(&again, ">Total<");
        assert!(total.contains("0&nbsp;/&nbsp;0"));
        assert!(!total.contains("2&nbsp;/&nbsp;5"));
        assert_eq!(total.matches(MARKER_ATTR).count(), 3);
        assert!(again.contains(r#"colspan="13""#));
    }

    #[test]
    fn test_read_total_round_trips_patched_page() {
        assert_eq!(read_total(FILE_PAGE), None);
        let out = patch_file_artifact(FILE_PAGE, &counts(), "/src/A.php").unwrap();
        assert_eq!(read_total(&out), Some(Aggregate::new(2, 5)));
    }

    #[test]
    fn test_page_without_table_is_untouched() {
        let html = "<html><body><p>nothing here</p></body></html>";
        assert_eq!(patch_file_artifact(html, &counts(), "/src/A.php"), None);
        assert_eq!(read_total(html), None);
    }

    #[test]
    fn test_row_label() {
        let label = RowLabel::from_cell(r##"&nbsp;<a href="#5"><abbr title="x">bar</abbr></a>"##);
        assert_eq!(label.text, "bar");
        assert!(label.indented);

        let label = RowLabel::from_cell(r#"<span class="glyphicon"></span> <a href="d/index.html">d</a>"#);
        assert_eq!(label.text, "d");
        assert!(!label.indented);
    }

    #[test]
    fn test_breadcrumb_root() {
        let index = r##"<ol class="breadcrumb">
          <li class="active">/app/src</li>
          <li>(<a href="dashboard.html">Dashboard</a>)</li>
        </ol>"##;
        assert_eq!(breadcrumb_root(index).as_deref(), Some("/app/src"));

        let page = r#"<ol class="breadcrumb"><li><a href="index.html">/app/src</a></li><li class="active">A.php</li></ol>"#;
        assert_eq!(breadcrumb_root(page).as_deref(), Some("/app/src"));

        assert_eq!(breadcrumb_root(FILE_PAGE), None);
        assert_eq!(breadcrumb_root(r#"<ol class="breadcrumb"><li> </li></ol>"#), None);
    }
}
