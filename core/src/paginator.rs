use crate::error::PagerErr;
use crate::error::Result;

/// Hard cap the host messaging surface places on one message.
pub const MAX_MESSAGE_SIZE: usize = 2000;

/// Wrap delimiters in priority order: a newline beats a space.
const DEFAULT_WRAP_DELIMITERS: [char; 2] = ['\n', ' '];

/// Accumulates lines into fixed-capacity pages of fenced text, wrapping
/// oversized lines at preferred delimiters so no closed page's rendering
/// (prefix and suffix included) ever exceeds `max_size`.
///
/// Closed pages are immutable; only the current page mutates, and it closes
/// the moment another line would push it over the limit.
pub struct WrappedPaginator {
    prefix: String,
    suffix: String,
    max_size: usize,
    wrap_on: Vec<char>,
    force_wrap: bool,
    closed: Vec<String>,
    current: Vec<String>,
    current_len: usize,
}

impl WrappedPaginator {
    pub fn new(prefix: &str, suffix: &str, max_size: usize) -> Self {
        Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            max_size,
            wrap_on: DEFAULT_WRAP_DELIMITERS.to_vec(),
            force_wrap: false,
            closed: Vec::new(),
            current: Vec::new(),
            current_len: prefix.len() + 1,
        }
    }

    pub fn with_force_wrap(mut self, force_wrap: bool) -> Self {
        self.force_wrap = force_wrap;
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Appends a logical line, wrapping as needed. Whitespace-only content
    /// is a no-op. Returns whether the page count changed.
    pub fn append(&mut self, line: &str) -> Result<bool> {
        if line.trim().is_empty() {
            return Ok(false);
        }
        self.append_inner(line)
    }

    /// Like [`Self::append`] but an empty or whitespace-only line still
    /// occupies a line on the page and can advance a page boundary.
    pub fn append_counted(&mut self, line: &str) -> Result<bool> {
        self.append_inner(line)
    }

    fn append_inner(&mut self, line: &str) -> Result<bool> {
        let capacity = self.line_capacity();
        let before = self.page_count();
        let delimiters = self.wrap_on.clone();

        let mut rest = line;
        while rest.len() > capacity {
            let window_end = boundary_at_or_before(rest, capacity.saturating_sub(1));
            let window = &rest[..window_end];
            let mut wrapped = false;

            for delimiter in &delimiters {
                if let Some(position) = window.rfind(*delimiter)
                    && position > 0
                {
                    self.push_line(&rest[..position]);
                    // The delimiter stays with the remainder so nothing in
                    // the original content is lost.
                    rest = &rest[position..];
                    wrapped = true;
                    break;
                }
            }

            if !wrapped {
                // A zero-length window cannot make progress, so even a
                // forced wrap has to give up on it.
                if self.force_wrap && window_end > 0 {
                    self.push_line(window);
                    rest = &rest[window_end..];
                } else {
                    return Err(PagerErr::UnwrappableLine {
                        length: line.len(),
                        run: rest.len(),
                        capacity,
                    });
                }
            }
        }
        self.push_line(rest);

        Ok(self.page_count() != before)
    }

    /// Closed pages plus the rendered current page. Never empty, so the
    /// interface can always render page 0.
    pub fn pages(&self) -> Vec<String> {
        let mut pages = self.closed.clone();
        if !self.current.is_empty() || pages.is_empty() {
            pages.push(self.render_current());
        }
        pages
    }

    pub fn page_count(&self) -> usize {
        if !self.current.is_empty() || self.closed.is_empty() {
            self.closed.len() + 1
        } else {
            self.closed.len()
        }
    }

    /// Room left for line content once decoration overhead is reserved.
    fn line_capacity(&self) -> usize {
        self.max_size
            .saturating_sub(self.prefix.len())
            .saturating_sub(self.suffix.len())
            .saturating_sub(2)
    }

    /// `line` is guaranteed to fit on an empty page by the wrap loop.
    fn push_line(&mut self, line: &str) {
        if self.current_len + line.len() + 1 > self.max_size - self.suffix.len() {
            self.close_current_page();
        }
        self.current_len += line.len() + 1;
        self.current.push(line.to_string());
    }

    fn close_current_page(&mut self) {
        let page = self.render_current();
        self.closed.push(page);
        self.current.clear();
        self.current_len = self.prefix.len() + 1;
    }

    fn render_current(&self) -> String {
        let mut page = String::with_capacity(self.current_len + self.suffix.len());
        page.push_str(&self.prefix);
        page.push('\n');
        for line in &self.current {
            page.push_str(line);
            page.push('\n');
        }
        page.push_str(&self.suffix);
        page
    }
}

/// Largest byte index not past `index` that falls on a char boundary.
fn boundary_at_or_before(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
