//! Keyword scanning: vocabulary, per-line counting, and page-at-a-time line reading.
//!
//! Everything here is single-threaded and stateless; the parallel driver in
//! `aggregate` calls these from one thread per page.

use hashbrown::HashSet;
use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::ops::AddAssign;

/// Upper bound on the up-front allocation for one page.
const MAX_PAGE_PREALLOC: usize = 4096;

/// Fixed set of words to count.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    words: HashSet<String>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Vocabulary {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            words: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Occurrence counts per vocabulary word. Words never seen are absent, not zero.
///
/// `+=` is element-wise addition: associative and commutative, so partial
/// results can be folded in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    word_frequencies: BTreeMap<String, usize>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-word counts in word order. Every stored count is non-zero.
    pub fn word_frequencies(&self) -> &BTreeMap<String, usize> {
        &self.word_frequencies
    }

    pub fn into_word_frequencies(self) -> BTreeMap<String, usize> {
        self.word_frequencies
    }

    pub fn count(&self, word: &str) -> usize {
        self.word_frequencies.get(word).copied().unwrap_or(0)
    }

    /// Add `n` occurrences of `word`. Adding zero leaves the map untouched.
    pub fn add(&mut self, word: &str, n: usize) {
        if n == 0 {
            return;
        }
        match self.word_frequencies.get_mut(word) {
            Some(count) => *count += n,
            None => {
                self.word_frequencies.insert(word.to_owned(), n);
            }
        }
    }

    fn add_owned(&mut self, word: String, n: usize) {
        if n != 0 {
            *self.word_frequencies.entry(word).or_insert(0) += n;
        }
    }
}

impl AddAssign<&Stats> for Stats {
    fn add_assign(&mut self, other: &Stats) {
        for (word, &n) in &other.word_frequencies {
            self.add(word, n);
        }
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, mut other: Stats) {
        if self.word_frequencies.len() < other.word_frequencies.len() {
            core::mem::swap(self, &mut other);
        }
        for (word, n) in other.word_frequencies {
            self.add_owned(word, n);
        }
    }
}

/// Count vocabulary words in one line. Tokens are whitespace-separated and
/// must match exactly, so `"rocks."` is not `"rocks"`.
pub fn explore_line(vocabulary: &Vocabulary, line: &str) -> Stats {
    let mut result = Stats::new();
    for word in line.split_whitespace() {
        if vocabulary.contains(word) {
            result.add(word, 1);
        }
    }
    result
}

pub fn explore_lines<I>(vocabulary: &Vocabulary, lines: I) -> Stats
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut result = Stats::new();
    for line in lines {
        result += explore_line(vocabulary, line.as_ref());
    }
    result
}

/// Read up to `page_size` lines. The returned page is shorter than
/// `page_size` only at end of input, and empty once input is exhausted.
/// Line terminators (`\n` or `\r\n`) are stripped.
///
/// Lines must be UTF-8; one that is not fails with
/// [`io::ErrorKind::InvalidData`].
pub fn fetch_page<R>(page_size: usize, reader: &mut R) -> io::Result<Vec<String>>
where
    R: BufRead + ?Sized,
{
    let mut page = Vec::with_capacity(page_size.min(MAX_PAGE_PREALLOC));
    while page.len() < page_size {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        page.push(line);
    }
    Ok(page)
}
