//! Output beautification for generated HTML and JavaScript.
//!
//! The HTML formatter keeps the author's line structure and only re-indents
//! it by element depth. Bodies of `pre`, `textarea`, `script` and `style`
//! are emitted untouched.

/// Indentation settings for a formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Spaces per indentation level
    pub indent_size: usize,

    /// Maximum consecutive line breaks kept; `1` drops all blank lines
    pub max_preserve_newlines: usize,
}

impl FormatOptions {
    pub const HTML: Self = Self {
        indent_size: 2,
        max_preserve_newlines: 1,
    };

    pub const JS: Self = Self {
        indent_size: 2,
        max_preserve_newlines: 2,
    };
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_ELEMENTS: &[&str] = &["pre", "textarea", "script", "style"];

/// Elements whose children are not indented.
const FLAT_ELEMENTS: &[&str] = &["html"];

/// Start tags that end an open `<p>`.
const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "details", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "menu", "nav", "ol", "p", "pre", "section", "table", "ul",
];

/// Re-indent an HTML document.
pub fn format_html(html: &str, options: FormatOptions) -> String {
    let mut formatter = HtmlFormatter::new(options);
    for line in html.lines() {
        formatter.push_line(line);
    }
    formatter.finish()
}

/// Convert leading tabs to spaces and collapse blank-line runs.
pub fn format_indented(code: &str, options: FormatOptions) -> String {
    let mut out = LineWriter::new(options);
    for line in code.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            out.blank();
            continue;
        }
        let tabs = trimmed.chars().take_while(|c| *c == '\t').count();
        out.push(tabs * options.indent_size, &trimmed[tabs..]);
    }
    out.finish()
}

/// Re-insert blank lines in front of the top-level statements of generated code.
///
/// `gaps[i]` is the number of blank lines wanted before statement `i`.
/// Statements are found as unindented lines, with a leading comment run
/// counted as part of the statement it precedes. When that count disagrees
/// with `gaps` the code is returned unchanged.
pub fn restore_blank_lines(code: &str, gaps: &[usize]) -> String {
    let lines: Vec<&str> = code.lines().collect();
    let starts = statement_starts(&lines);

    if starts.len() != gaps.len() {
        tracing::debug!(
            "Found {} statements in generated code, expected {}; blank lines not restored",
            starts.len(),
            gaps.len()
        );
        return code.to_string();
    }

    let mut out = String::with_capacity(code.len() + gaps.iter().sum::<usize>());
    let mut pending = starts.iter().zip(gaps).peekable();

    for (i, line) in lines.iter().enumerate() {
        if let Some((_, gap)) = pending.next_if(|(start, _)| **start == i) {
            for _ in 0..*gap {
                out.push('\n');
            }
        }
        out.push_str(line);
        out.push('\n');
    }

    out
}

fn statement_starts(lines: &[&str]) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut comment_start = None;

    for (i, line) in lines.iter().enumerate() {
        if line.is_empty()
            || line.starts_with(char::is_whitespace)
            || line.starts_with(['}', ')', ']'])
        {
            continue;
        }
        if line.starts_with("//") || line.starts_with("/*") {
            comment_start.get_or_insert(i);
            continue;
        }
        starts.push(comment_start.take().unwrap_or(i));
    }

    starts
}

#[derive(Debug)]
enum State {
    Text,
    Tag {
        name: String,
        closing: bool,
        quote: Option<char>,
        slash: bool,
    },
    Comment,
    Declaration,
    Raw(String),
}

struct HtmlFormatter {
    options: FormatOptions,
    /// Open elements, outermost first
    open: Vec<String>,
    state: State,
    out: LineWriter,
}

impl HtmlFormatter {
    fn new(options: FormatOptions) -> Self {
        Self {
            options,
            open: Vec::new(),
            state: State::Text,
            out: LineWriter::new(options),
        }
    }

    fn push_line(&mut self, line: &str) {
        let trimmed = line.trim();

        if let State::Raw(name) = &self.state {
            let closing = format!("</{}", name);
            if !trimmed.to_ascii_lowercase().starts_with(&closing) {
                self.out.push_verbatim(line.trim_end());
                self.scan(line);
                return;
            }
        }

        if trimmed.is_empty() {
            self.out.blank();
            return;
        }

        let depth = match self.state {
            State::Tag { .. } | State::Declaration => self.open.len() + 1,
            State::Text | State::Raw(_) => self.line_depth(trimmed),
            State::Comment => self.open.len(),
        };

        self.out.push(depth * self.options.indent_size, trimmed);
        self.scan(trimmed);
    }

    /// Advance the tag state machine over one line.
    fn scan(&mut self, line: &str) {
        let mut i = 0;

        while i < line.len() {
            let rest = &line[i..];
            let mut next_state = None;
            let mut finished = None;

            match &mut self.state {
                State::Text => {
                    if rest.starts_with("<!--") {
                        next_state = Some(State::Comment);
                        i += 4;
                    } else if rest.starts_with("<!") || rest.starts_with("<?") {
                        next_state = Some(State::Declaration);
                        i += 2;
                    } else if rest.starts_with('<') {
                        let closing = rest[1..].starts_with('/');
                        let start = if closing { 2 } else { 1 };
                        let name: String = rest[start..]
                            .chars()
                            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == ':')
                            .collect();

                        if name.starts_with(|c: char| c.is_ascii_alphabetic()) {
                            i += start + name.len();
                            next_state = Some(State::Tag {
                                name: name.to_ascii_lowercase(),
                                closing,
                                quote: None,
                                slash: false,
                            });
                        } else {
                            i += 1;
                        }
                    } else {
                        i += rest.chars().next().map_or(1, char::len_utf8);
                    }
                }
                State::Comment => match rest.find("-->") {
                    Some(end) => {
                        i += end + 3;
                        next_state = Some(State::Text);
                    }
                    None => i = line.len(),
                },
                State::Declaration => match rest.find('>') {
                    Some(end) => {
                        i += end + 1;
                        next_state = Some(State::Text);
                    }
                    None => i = line.len(),
                },
                State::Tag {
                    name,
                    closing,
                    quote,
                    slash,
                } => {
                    let c = rest.chars().next().unwrap_or('>');
                    i += c.len_utf8();
                    match *quote {
                        Some(q) if c == q => *quote = None,
                        Some(_) => {}
                        None => match c {
                            '"' | '\'' => *quote = Some(c),
                            '/' => *slash = true,
                            '>' => finished = Some((std::mem::take(name), *closing, *slash)),
                            c if !c.is_whitespace() => *slash = false,
                            _ => {}
                        },
                    }
                }
                State::Raw(name) => {
                    let closing = format!("</{}", name);
                    match rest.to_ascii_lowercase().find(&closing) {
                        Some(pos) => {
                            i += pos;
                            next_state = Some(State::Text);
                        }
                        None => i = line.len(),
                    }
                }
            }

            if let Some((name, closing, slash)) = finished {
                self.state = State::Text;
                self.finish_tag(name, closing, slash);
            } else if let Some(state) = next_state {
                self.state = state;
            }
        }
    }

    /// Depth of a line, accounting for the tag it starts with.
    fn line_depth(&self, line: &str) -> usize {
        let depth = self.open.len();

        if let Some(rest) = line.strip_prefix("</") {
            let name = tag_name(rest);
            return self
                .open
                .iter()
                .rposition(|open| *open == name)
                .unwrap_or(depth);
        }
        if let Some(rest) = line.strip_prefix('<') {
            return depth - implied_ends(&self.open, &tag_name(rest));
        }
        depth
    }

    fn finish_tag(&mut self, name: String, closing: bool, slash: bool) {
        if FLAT_ELEMENTS.contains(&name.as_str()) {
            return;
        }
        if closing {
            // A stray end tag closes nothing
            if let Some(pos) = self.open.iter().rposition(|open| *open == name) {
                self.open.truncate(pos);
            }
            return;
        }

        let ended = implied_ends(&self.open, &name);
        self.open.truncate(self.open.len() - ended);

        if slash || VOID_ELEMENTS.contains(&name.as_str()) {
            return;
        }
        if RAW_ELEMENTS.contains(&name.as_str()) {
            self.state = State::Raw(name.clone());
        }
        self.open.push(name);
    }

    fn finish(self) -> String {
        self.out.finish()
    }
}

fn tag_name(rest: &str) -> String {
    rest.chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == ':')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// How many innermost open elements a start tag `name` ends implicitly.
fn implied_ends(open: &[String], name: &str) -> usize {
    open.iter()
        .rev()
        .take_while(|current| ends_implicitly(current, name))
        .count()
}

/// Whether the start tag `next` ends an open `current` element.
fn ends_implicitly(current: &str, next: &str) -> bool {
    match current {
        "p" => CLOSES_PARAGRAPH.contains(&next),
        "li" => next == "li",
        "dt" | "dd" => matches!(next, "dt" | "dd"),
        "option" => matches!(next, "option" | "optgroup"),
        "optgroup" => next == "optgroup",
        "td" | "th" => matches!(next, "td" | "th" | "tr" | "thead" | "tbody" | "tfoot"),
        "tr" => matches!(next, "tr" | "thead" | "tbody" | "tfoot"),
        "thead" | "tbody" => matches!(next, "tbody" | "tfoot"),
        _ => false,
    }
}

/// Collects output lines, limiting runs of blank lines.
struct LineWriter {
    max_blank: usize,
    pending_blank: usize,
    lines: Vec<String>,
}

impl LineWriter {
    fn new(options: FormatOptions) -> Self {
        Self {
            max_blank: options.max_preserve_newlines.saturating_sub(1),
            pending_blank: 0,
            lines: Vec::new(),
        }
    }

    fn blank(&mut self) {
        self.pending_blank += 1;
    }

    fn flush_blank(&mut self) {
        if !self.lines.is_empty() {
            for _ in 0..self.pending_blank.min(self.max_blank) {
                self.lines.push(String::new());
            }
        }
        self.pending_blank = 0;
    }

    fn push(&mut self, indent: usize, content: &str) {
        self.flush_blank();
        self.lines.push(format!("{}{}", " ".repeat(indent), content));
    }

    fn push_verbatim(&mut self, line: &str) {
        self.flush_blank();
        self.lines.push(line.to_string());
    }

    fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}
