// glossa/src/segmenter.rs
//
// Turns the raw text of a morpheme-break line into a list of morphs.
//
// Users often type "institution-al-ly" without spaces. Every marker that has
// a word on both sides and no separator on either is ambiguous: it could close
// the morph before it or open the one after it. The repair pass resolves this
// relative to the root: markers after the root open the following morph
// ("institution -al -ly"), markers before the root close the preceding one
// ("re- institution"). The repaired text is then split on separators.
//
// All offsets are in chars.

use crate::markers::MarkerTable;
use serde::Serialize;
use tracing::{trace, warn};

/// One morph of the repaired line and the whitespace that followed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentedMorph {
    pub text: String,
    /// Whitespace chars between this morph and the next (trailing for the last).
    pub gap: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segmentation {
    pub morphs: Vec<SegmentedMorph>,
    /// Cursor in `render()` coordinates.
    pub cursor: usize,
    /// False if the repair pass stopped at its iteration limit.
    pub converged: bool,
}

impl Segmentation {
    /// The morph line as it should now be displayed.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for m in &self.morphs {
            out.push_str(&m.text);
            out.extend(std::iter::repeat(' ').take(m.gap));
        }
        out
    }
}

/// A segment between break markers, as a trimmed char range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    start: usize,
    end: usize,
    sep_before: bool,
    sep_after: bool,
}

impl Segment {
    fn len(&self) -> usize {
        self.end - self.start
    }
}

/// A maximal run of adjacent markers and the whitespace around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MarkerRun {
    start: usize,
    end: usize,
    ws_before: usize,
    ws_after: usize,
    word_before: bool,
    word_after: bool,
}

impl MarkerRun {
    fn is_ambiguous(&self, width: usize) -> bool {
        self.word_before && self.word_after && self.ws_before < width && self.ws_after < width
    }
}

fn ws_run(chars: &[char], at: usize) -> usize {
    chars[at..].iter().take_while(|c| c.is_whitespace()).count()
}

fn ws_run_back(chars: &[char], end: usize) -> usize {
    chars[..end].iter().rev().take_while(|c| c.is_whitespace()).count()
}

pub struct Segmenter<'a> {
    markers: &'a MarkerTable,
    phrase_width: usize,
}

impl<'a> Segmenter<'a> {
    pub fn new(markers: &'a MarkerTable, phrase_width: usize) -> Self {
        Self {
            markers,
            phrase_width: phrase_width.max(1),
        }
    }

    /// Separator width for a baseline word: wider for multi-word phrases so
    /// single spaces stay inside morphs.
    pub fn separator_width(&self, baseline: &str) -> usize {
        if baseline.trim().contains(char::is_whitespace) {
            self.phrase_width
        } else {
            1
        }
    }

    pub fn segment(&self, raw: &str, baseline: &str, cursor: usize) -> Segmentation {
        let width = self.separator_width(baseline);
        let mut chars: Vec<char> = raw.chars().collect();
        let mut cursor = cursor.min(chars.len());

        let segments = self.segments(&chars, width);
        let mut root_start = select_root(&segments).map_or(0, |root| root.start);
        trace!(raw, root_start, width, "segment: root selected");

        let limit = self.marker_runs(&chars).len() + segments.len() + 1;
        let mut converged = true;
        let mut iterations = 0;
        loop {
            let Some(run) = self
                .marker_runs(&chars)
                .into_iter()
                .find(|r| r.is_ambiguous(width))
            else {
                break;
            };
            if iterations >= limit {
                converged = false;
                warn!(raw, "segment: marker repair did not converge");
                break;
            }
            iterations += 1;

            let (pos, count) = if run.end <= root_start {
                (run.end, width - run.ws_after)
            } else {
                (run.start, width - run.ws_before)
            };
            chars.splice(pos..pos, std::iter::repeat(' ').take(count));
            if pos <= root_start {
                root_start += count;
            }
            if pos < cursor {
                cursor += count;
            }
            trace!(pos, count, "segment: inserted separator");
        }

        let (morphs, leading) = split(&chars, width);
        Segmentation {
            morphs,
            cursor: cursor.saturating_sub(leading),
            converged,
        }
    }

    /// Segments between break markers (markers and separators).
    fn segments(&self, chars: &[char], width: usize) -> Vec<Segment> {
        let n = chars.len();
        let mut boundary = vec![false; n];
        let mut i = 0;
        while i < n {
            if let Some(len) = self.markers.marker_at(chars, i) {
                boundary[i..i + len].iter_mut().for_each(|b| *b = true);
                i += len;
            } else if chars[i].is_whitespace() {
                let run = ws_run(chars, i);
                if run >= width {
                    boundary[i..i + run].iter_mut().for_each(|b| *b = true);
                }
                i += run;
            } else {
                i += 1;
            }
        }

        // Whether the boundary run ending at `end` (exclusive) or starting at
        // `start` holds a separator.
        let has_separator = |range: std::ops::Range<usize>| -> bool {
            let mut run = 0;
            for c in &chars[range] {
                if c.is_whitespace() {
                    run += 1;
                    if run >= width {
                        return true;
                    }
                } else {
                    run = 0;
                }
            }
            false
        };

        let mut out = Vec::new();
        let mut i = 0;
        while i < n {
            if boundary[i] {
                i += 1;
                continue;
            }
            let raw_start = i;
            while i < n && !boundary[i] {
                i += 1;
            }
            let raw_end = i;
            let start = raw_start + ws_run(&chars[..raw_end], raw_start);
            let end = raw_end - ws_run_back(&chars[start..raw_end], raw_end - start);
            if start >= end {
                continue;
            }
            let before_start = boundary[..raw_start]
                .iter()
                .rev()
                .take_while(|b| **b)
                .count();
            let after_end = boundary[raw_end..].iter().take_while(|b| **b).count();
            out.push(Segment {
                start,
                end,
                sep_before: has_separator(raw_start - before_start..raw_start),
                sep_after: has_separator(raw_end..raw_end + after_end),
            });
        }
        out
    }

    fn marker_runs(&self, chars: &[char]) -> Vec<MarkerRun> {
        let n = chars.len();
        let mut runs = Vec::new();
        let mut i = 0;
        while i < n {
            let Some(len) = self.markers.marker_at(chars, i) else {
                i += 1;
                continue;
            };
            let start = i;
            let mut end = i + len;
            while let Some(len) = self.markers.marker_at(chars, end) {
                end += len;
            }
            let ws_before = ws_run_back(chars, start);
            let ws_after = ws_run(chars, end);
            runs.push(MarkerRun {
                start,
                end,
                ws_before,
                ws_after,
                word_before: start > ws_before,
                word_after: end + ws_after < n,
            });
            i = end;
        }
        runs
    }
}

/// A segment bounded by separators on both sides wins. Otherwise the longest;
/// with more than two equally long, the second of them.
fn select_root(segments: &[Segment]) -> Option<Segment> {
    if let Some(s) = segments.iter().find(|s| s.sep_before && s.sep_after) {
        return Some(*s);
    }
    let longest = segments.iter().map(Segment::len).max()?;
    let tied: Vec<&Segment> = segments.iter().filter(|s| s.len() == longest).collect();
    let pick = if tied.len() > 2 { tied[1] } else { tied[0] };
    Some(*pick)
}

/// Split repaired text on separators. Returns the morphs and the count of
/// leading whitespace chars that were dropped.
fn split(chars: &[char], width: usize) -> (Vec<SegmentedMorph>, usize) {
    let n = chars.len();
    let leading = ws_run(chars, 0);
    let mut morphs = Vec::new();
    let mut push = |piece: &[char], gap: usize| {
        let text: String = piece.iter().collect();
        let text = text.trim();
        if !text.is_empty() {
            morphs.push(SegmentedMorph {
                text: text.to_string(),
                gap,
            });
        }
    };

    let mut start = leading;
    let mut i = leading;
    while i < n {
        if chars[i].is_whitespace() {
            let run = ws_run(chars, i);
            if run >= width || i + run == n {
                push(&chars[start..i], run);
                start = i + run;
            }
            i += run;
        } else {
            i += 1;
        }
    }
    if start < n {
        push(&chars[start..n], 0);
    }
    (morphs, leading)
}
