//! Reader for the textual calibration file format.
//!
//! A file is a stream of whitespace separated tokens with case-insensitive
//! keywords:
//!
//! ```text
//! width 640
//! height 480
//! camera matrix <9 floats, row-major>
//! distortion <5 floats>
//! rectification <9 floats, row-major>
//! projection <12 floats, row-major>
//! ```
//!
//! Single-camera files hold one such block, stereo files hold two. Anything
//! that is not a keyword (section headers, camera names, comments starting
//! with `#`) is skipped.

use std::fs;
use std::path::Path;

use nalgebra::{Matrix3, Matrix3x4, Vector5};
use thiserror::Error;

use crate::geometry::{Resolution, Side};

/// Fields of a calibration block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Width,
    Height,
    CameraMatrix,
    Distortion,
    Rectification,
    Projection,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Width => "width",
            Field::Height => "height",
            Field::CameraMatrix => "camera matrix",
            Field::Distortion => "distortion",
            Field::Rectification => "rectification",
            Field::Projection => "projection",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calibration file errors.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Calibration file is missing `{0}`")]
    MissingField(Field),
    #[error("Malformed number `{token}` in `{field}`")]
    MalformedNumber { field: Field, token: String },
    #[error("`{field}` ends after {found} of {expected} values")]
    Truncated {
        field: Field,
        expected: usize,
        found: usize,
    },
    #[error("Failed to read calibration file: {0}")]
    Io(#[from] std::io::Error),
}

/// One complete camera block.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationBlock {
    pub width: u32,
    pub height: u32,
    pub camera_matrix: Matrix3<f64>,
    pub distortion: Vector5<f64>,
    pub rectification: Matrix3<f64>,
    pub projection: Matrix3x4<f64>,
}

impl CalibrationBlock {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Contents of a stereo calibration file.
///
/// Blocks are assigned by order of appearance: the first occurrence of each
/// field goes to `left`, the second to `right`. A file listing the right
/// camera first is read swapped.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoCalibrationFile {
    /// Component-wise minimum of the present blocks' width and height;
    /// `None` when neither block is complete.
    pub resolution: Option<Resolution>,
    pub left: Option<CalibrationBlock>,
    pub right: Option<CalibrationBlock>,
}

impl StereoCalibrationFile {
    pub fn block(&self, side: Side) -> Option<&CalibrationBlock> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }
}

/// Parse a single-camera calibration file.
///
/// Returns as soon as all six fields have been seen; later tokens are not
/// read. A field repeated before the block is complete keeps its first value.
pub fn parse_single(text: &str) -> Result<CalibrationBlock, CodecError> {
    let mut lexer = Lexer::new(text);
    let mut block = PartialBlock::default();

    while let Some(item) = next_item(&mut lexer)? {
        block.offer(item);
        if block.is_complete() {
            break;
        }
    }

    block.finish()
}

/// Parse a stereo calibration file holding up to two blocks.
///
/// A block missing any field is reported as absent rather than failing the
/// parse, and does not contribute to the resolution. Only malformed or
/// truncated numbers are errors.
pub fn parse_stereo(text: &str) -> Result<StereoCalibrationFile, CodecError> {
    let mut lexer = Lexer::new(text);
    let mut first = PartialBlock::default();
    let mut second = PartialBlock::default();

    while let Some(item) = next_item(&mut lexer)? {
        if let Some(item) = first.offer(item) {
            // Third and later occurrences are ignored.
            let _ = second.offer(item);
        }
    }

    let left = first.finish().ok();
    let right = second.finish().ok();
    let resolution = match (&left, &right) {
        (Some(l), Some(r)) => Some(l.resolution().min(r.resolution())),
        (Some(block), None) | (None, Some(block)) => Some(block.resolution()),
        (None, None) => None,
    };

    Ok(StereoCalibrationFile {
        resolution,
        left,
        right,
    })
}

/// Read and parse a single-camera calibration file from disk.
pub fn read_single(path: impl AsRef<Path>) -> Result<CalibrationBlock, CodecError> {
    let text = fs::read_to_string(path)?;
    parse_single(&text)
}

/// Read and parse a stereo calibration file from disk.
pub fn read_stereo(path: impl AsRef<Path>) -> Result<StereoCalibrationFile, CodecError> {
    let text = fs::read_to_string(path)?;
    parse_stereo(&text)
}

/// A parsed keyword and its value.
#[derive(Debug, Clone)]
enum Item {
    Width(u32),
    Height(u32),
    CameraMatrix(Matrix3<f64>),
    Distortion(Vector5<f64>),
    Rectification(Matrix3<f64>),
    Projection(Matrix3x4<f64>),
}

#[derive(Debug, Default)]
struct PartialBlock {
    width: Option<u32>,
    height: Option<u32>,
    camera_matrix: Option<Matrix3<f64>>,
    distortion: Option<Vector5<f64>>,
    rectification: Option<Matrix3<f64>>,
    projection: Option<Matrix3x4<f64>>,
}

impl PartialBlock {
    /// Store the item if its slot is free, otherwise hand it back.
    fn offer(&mut self, item: Item) -> Option<Item> {
        fn fill<T>(slot: &mut Option<T>, value: T, item: impl FnOnce(T) -> Item) -> Option<Item> {
            if slot.is_none() {
                *slot = Some(value);
                None
            } else {
                Some(item(value))
            }
        }

        match item {
            Item::Width(v) => fill(&mut self.width, v, Item::Width),
            Item::Height(v) => fill(&mut self.height, v, Item::Height),
            Item::CameraMatrix(v) => fill(&mut self.camera_matrix, v, Item::CameraMatrix),
            Item::Distortion(v) => fill(&mut self.distortion, v, Item::Distortion),
            Item::Rectification(v) => fill(&mut self.rectification, v, Item::Rectification),
            Item::Projection(v) => fill(&mut self.projection, v, Item::Projection),
        }
    }

    fn is_complete(&self) -> bool {
        self.width.is_some()
            && self.height.is_some()
            && self.camera_matrix.is_some()
            && self.distortion.is_some()
            && self.rectification.is_some()
            && self.projection.is_some()
    }

    fn finish(self) -> Result<CalibrationBlock, CodecError> {
        Ok(CalibrationBlock {
            width: self.width.ok_or(CodecError::MissingField(Field::Width))?,
            height: self.height.ok_or(CodecError::MissingField(Field::Height))?,
            camera_matrix: self
                .camera_matrix
                .ok_or(CodecError::MissingField(Field::CameraMatrix))?,
            distortion: self
                .distortion
                .ok_or(CodecError::MissingField(Field::Distortion))?,
            rectification: self
                .rectification
                .ok_or(CodecError::MissingField(Field::Rectification))?,
            projection: self
                .projection
                .ok_or(CodecError::MissingField(Field::Projection))?,
        })
    }
}

/// Read the next keyword item, skipping unrelated tokens.
fn next_item(lexer: &mut Lexer<'_>) -> Result<Option<Item>, CodecError> {
    while let Some(token) = lexer.next_token() {
        let item = if token.eq_ignore_ascii_case("width") {
            Item::Width(read_integer(lexer, Field::Width)?)
        } else if token.eq_ignore_ascii_case("height") {
            Item::Height(read_integer(lexer, Field::Height)?)
        } else if token.eq_ignore_ascii_case("camera") {
            match lexer.next_token() {
                Some(next) if next.eq_ignore_ascii_case("matrix") => {
                    let values = read_floats(lexer, Field::CameraMatrix, 9)?;
                    Item::CameraMatrix(Matrix3::from_row_slice(&values))
                }
                Some(next) => {
                    // Not ours: let the caller see it as the next token.
                    lexer.push_back(next);
                    continue;
                }
                None => return Ok(None),
            }
        } else if token.eq_ignore_ascii_case("distortion") {
            let values = read_floats(lexer, Field::Distortion, 5)?;
            Item::Distortion(Vector5::from_column_slice(&values))
        } else if token.eq_ignore_ascii_case("rectification") {
            let values = read_floats(lexer, Field::Rectification, 9)?;
            Item::Rectification(Matrix3::from_row_slice(&values))
        } else if token.eq_ignore_ascii_case("projection") {
            let values = read_floats(lexer, Field::Projection, 12)?;
            Item::Projection(Matrix3x4::from_row_slice(&values))
        } else {
            continue;
        };
        return Ok(Some(item));
    }
    Ok(None)
}

fn read_integer(lexer: &mut Lexer<'_>, field: Field) -> Result<u32, CodecError> {
    let token = lexer.next_token().ok_or(CodecError::Truncated {
        field,
        expected: 1,
        found: 0,
    })?;
    token.parse().map_err(|_| CodecError::MalformedNumber {
        field,
        token: token.to_string(),
    })
}

/// Consume exactly `count` tokens as doubles.
fn read_floats(lexer: &mut Lexer<'_>, field: Field, count: usize) -> Result<Vec<f64>, CodecError> {
    let mut values = Vec::with_capacity(count);
    for found in 0..count {
        let token = lexer.next_token().ok_or(CodecError::Truncated {
            field,
            expected: count,
            found,
        })?;
        let value = token.parse::<f64>().map_err(|_| CodecError::MalformedNumber {
            field,
            token: token.to_string(),
        })?;
        values.push(value);
    }
    Ok(values)
}

/// Whitespace tokenizer with one-token pushback.
///
/// Word characters are letters, digits and `_ . - +`; any other
/// non-whitespace character is a token on its own. `#` starts a comment that
/// runs to the end of the line.
struct Lexer<'a> {
    text: &'a str,
    pos: usize,
    pushed: Vec<&'a str>,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            pushed: Vec::new(),
        }
    }

    fn push_back(&mut self, token: &'a str) {
        self.pushed.push(token);
    }

    fn next_token(&mut self) -> Option<&'a str> {
        if let Some(token) = self.pushed.pop() {
            return Some(token);
        }

        let text: &'a str = self.text;
        loop {
            let rest = &text[self.pos..];
            let ch = rest.chars().next()?;

            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
                continue;
            }

            if ch == '#' {
                self.pos += rest.find('\n').unwrap_or(rest.len());
                continue;
            }

            if !is_word_char(ch) {
                self.pos += ch.len_utf8();
                return Some(&rest[..ch.len_utf8()]);
            }

            let end = rest
                .char_indices()
                .find(|&(_, c)| !is_word_char(c))
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            self.pos += end;
            return Some(&rest[..end]);
        }
    }
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '.' | '-' | '+')
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY_BLOCK: &str = "width 640\nheight 480\ncamera matrix 1 0 0 0 1 0 0 0 1\n\
        distortion 0 0 0 0 0\nrectification 1 0 0 0 1 0 0 0 1\n\
        projection 1 0 0 0 0 1 0 0 0 0 1 0";

    const STEREO_FILE: &str = "# oST version 5.0 parameters\n\
        [image]\nwidth\n640\nheight\n480\n\
        [narrow_stereo/left]\ncamera matrix\n700.5 0 320.1\n0 701.2 240.3\n0 0 1\n\
        distortion\n-0.28 0.07 0.001 -0.0005 0\n\
        rectification\n1 0 0\n0 1 0\n0 0 1\n\
        projection\n700 0 320 0\n0 700 240 0\n0 0 1 0\n\
        [image]\nwidth\n800\nheight\n400\n\
        [narrow_stereo/right]\ncamera matrix\n690 0 330\n0 691 250\n0 0 1\n\
        distortion\n-0.3 0.08 0 0 0\n\
        rectification\n1 0 0\n0 1 0\n0 0 1\n\
        projection\n700 0 320 -42.5\n0 700 240 0\n0 0 1 0\n";

    #[test]
    fn test_parse_identity_block() {
        let block = parse_single(IDENTITY_BLOCK).unwrap();
        assert_eq!(block.width, 640);
        assert_eq!(block.height, 480);
        assert_eq!(block.camera_matrix, Matrix3::identity());
        assert_eq!(block.distortion, Vector5::zeros());
        assert_eq!(block.rectification, Matrix3::identity());
        assert_eq!(
            block.projection,
            Matrix3x4::new(1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0)
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let text = IDENTITY_BLOCK
            .replace("width", "WIDTH")
            .replace("camera matrix", "Camera Matrix")
            .replace("projection", "Projection");
        let block = parse_single(&text).unwrap();
        assert_eq!(block.width, 640);
        assert_eq!(block.camera_matrix, Matrix3::identity());
    }

    #[test]
    fn test_camera_without_matrix_pushes_token_back() {
        // `camera` followed by another keyword must not swallow it.
        let text = format!("camera width 320 {}", IDENTITY_BLOCK.replace("width 640", ""));
        let block = parse_single(&text).unwrap();
        assert_eq!(block.width, 320);
        assert_eq!(block.height, 480);
    }

    #[test]
    fn test_missing_field_is_named() {
        let text = IDENTITY_BLOCK.replace("distortion 0 0 0 0 0", "");
        match parse_single(&text) {
            Err(CodecError::MissingField(field)) => assert_eq!(field, Field::Distortion),
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_number() {
        let text = IDENTITY_BLOCK.replace("distortion 0 0 0", "distortion 0 zero 0");
        match parse_single(&text) {
            Err(CodecError::MalformedNumber { field, token }) => {
                assert_eq!(field, Field::Distortion);
                assert_eq!(token, "zero");
            }
            other => panic!("expected MalformedNumber, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_width() {
        let text = IDENTITY_BLOCK.replace("width 640", "width 640.5");
        assert!(matches!(
            parse_single(&text),
            Err(CodecError::MalformedNumber {
                field: Field::Width,
                ..
            })
        ));
    }

    #[test]
    fn test_truncated_block() {
        let text = "width 640 height 480 projection 1 0 0";
        match parse_single(text) {
            Err(CodecError::Truncated {
                field,
                expected,
                found,
            }) => {
                assert_eq!(field, Field::Projection);
                assert_eq!(expected, 12);
                assert_eq!(found, 3);
            }
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn test_single_stops_after_complete_block() {
        // Garbage after a complete block is never read.
        let text = format!("{}\nwidth not-a-number", IDENTITY_BLOCK);
        assert_eq!(parse_single(&text).unwrap().width, 640);
    }

    #[test]
    fn test_parse_stereo_file() {
        let file = parse_stereo(STEREO_FILE).unwrap();
        assert_eq!(file.resolution, Some(Resolution::new(640, 400)));

        let left = file.left.as_ref().unwrap();
        assert_eq!(left.width, 640);
        assert!((left.camera_matrix[(0, 0)] - 700.5).abs() < 1e-12);
        assert!((left.distortion[0] + 0.28).abs() < 1e-12);

        let right = file.block(Side::Right).unwrap();
        assert_eq!(right.width, 800);
        assert!((right.projection[(0, 3)] + 42.5).abs() < 1e-12);
    }

    #[test]
    fn test_stereo_incomplete_second_block_is_absent() {
        let text = format!("{}\nwidth 320\nheight 240\ndistortion 0 0 0 0 0", IDENTITY_BLOCK);
        let file = parse_stereo(&text).unwrap();
        assert!(file.left.is_some());
        assert!(file.right.is_none());
        // The incomplete block's dimensions do not shrink the resolution.
        assert_eq!(file.resolution, Some(Resolution::new(640, 480)));
    }

    #[test]
    fn test_stereo_without_dimensions_has_no_blocks() {
        let file = parse_stereo("camera matrix 1 0 0 0 1 0 0 0 1 distortion 0 0 0 0 0").unwrap();
        assert!(file.left.is_none());
        assert!(file.right.is_none());
        assert_eq!(file.resolution, None);
    }

    #[test]
    fn test_stereo_malformed_number_still_fails() {
        assert!(matches!(
            parse_stereo("width 640 height abc"),
            Err(CodecError::MalformedNumber {
                field: Field::Height,
                ..
            })
        ));
    }

    #[test]
    fn test_lexer_tokens() {
        let mut lexer = Lexer::new("[narrow_stereo/left] # comment width\n-1.5e-3");
        let tokens: Vec<_> = std::iter::from_fn(|| lexer.next_token()).collect();
        assert_eq!(tokens, vec!["[", "narrow_stereo", "/", "left", "]", "-1.5e-3"]);
    }
}
