//! USDA (ASCII) layer parser.
//!
//! This module provides line-by-line parsing of USDA text files.
//! The parser is intentionally simple and handles the most common USD patterns.
//!
//! # Supported Syntax
//!
//! - Layer header: `upAxis`, `metersPerUnit`, `defaultPrim`, `startTimeCode`,
//!   `endTimeCode`, `timeCodesPerSecond`
//! - `def Xform "Name" { ... }` (also `Scope`, `SkelRoot` and typeless `def "Name"`)
//! - `def Mesh "Name" { ... }`
//! - `def PointInstancer "Name" { ... }`
//! - `references = @path@</Prim>` and `payload = @path@` metadata
//! - `point3f[] points`, `int[] faceVertexCounts`, `int[] faceVertexIndices`,
//!   `normal3f[] normals`, `color3f[] primvars:displayColor`, `orientation`
//! - `point3f[] positions`, `quath[] orientations`, `float3[] scales`,
//!   `int[] protoIndices`, `rel prototypes` (for PointInstancer)
//! - `xformOp:translate|scale|rotateX|rotateY|rotateZ|rotateXYZ|orient|transform`,
//!   constant or `.timeSamples = { t: value, ... }`, ordered by `xformOpOrder`
//!
//! Blocks the parser does not understand (`over`, `class`, dictionaries,
//! time-sampled non-transform attributes) are skipped as a whole.

use std::collections::VecDeque;

use zview_math::{Mat4, Quat, Vec3};
use thiserror::Error;

use super::types::*;
use crate::xform::{AnimatedXformOp, XformOp, XformStack};

/// Errors that can occur during USDA parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unexpected end of file")]
    UnexpectedEof,

    #[error("Invalid number format: {0}")]
    InvalidNumber(String),

    #[error("Unclosed block starting at line {0}")]
    UnclosedBlock(usize),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Prim types parsed as plain transform groups.
const GROUP_TYPES: &[&str] = &["Xform", "Scope", "SkelRoot"];

/// USDA file parser.
pub struct UsdaParser {
    lines: VecDeque<(usize, String)>,
    current_line: usize,
}

/// Everything a prim body can author; each prim kind takes what it needs.
#[derive(Default)]
struct PrimBody {
    xform: XformCollector,
    children: Vec<UsdPrim>,

    points: Vec<Vec3>,
    face_vertex_counts: Vec<i32>,
    face_vertex_indices: Vec<i32>,
    normals: Option<Vec<Vec3>>,
    display_color: Option<Vec3>,
    left_handed: bool,

    positions: Vec<Vec3>,
    proto_indices: Vec<i32>,
    orientations: Option<Vec<Quat>>,
    scales: Option<Vec<Vec3>>,
    prototypes: Vec<String>,
}

/// Named xformOps plus the authored `xformOpOrder`.
#[derive(Default)]
struct XformCollector {
    ops: Vec<(String, AnimatedXformOp)>,
    order: Option<Vec<String>>,
}

impl XformCollector {
    /// Resolve into an op stack. Without `xformOpOrder`, declaration order is used.
    fn finish(self, prim_path: &str) -> XformStack {
        let mut stack = XformStack::default();

        let Some(order) = self.order else {
            for (_, op) in self.ops {
                stack.push(op, false);
            }
            return stack;
        };

        for entry in &order {
            let (name, invert) = match entry.strip_prefix("!invert!") {
                Some(name) => (name, true),
                None => (entry.as_str(), false),
            };
            match self.ops.iter().find(|(n, _)| n == name) {
                Some((_, op)) => stack.push(op.clone(), invert),
                None => log::debug!("{}: xformOpOrder names missing op {}", prim_path, name),
            }
        }
        stack
    }
}

/// Kinds of xformOp the parser understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OpKind {
    Translate,
    Scale,
    RotateX,
    RotateY,
    RotateZ,
    RotateXYZ,
    Orient,
    Transform,
}

impl OpKind {
    /// `xformOp:<kind>[:suffix]` -> kind
    fn from_name(name: &str) -> Option<Self> {
        let kind = name.strip_prefix("xformOp:")?.split(':').next()?;
        Some(match kind {
            "translate" => OpKind::Translate,
            "scale" => OpKind::Scale,
            "rotateX" => OpKind::RotateX,
            "rotateY" => OpKind::RotateY,
            "rotateZ" => OpKind::RotateZ,
            "rotateXYZ" => OpKind::RotateXYZ,
            "orient" => OpKind::Orient,
            "transform" => OpKind::Transform,
            _ => return None,
        })
    }
}

impl UsdaParser {
    /// Create a new parser from file contents.
    pub fn new(content: &str) -> Self {
        let lines: VecDeque<_> = content
            .lines()
            .enumerate()
            .map(|(i, s)| (i + 1, s.to_string()))
            .collect();

        Self {
            lines,
            current_line: 0,
        }
    }

    /// Parse the USDA content into a layer.
    pub fn parse(&mut self) -> ParseResult<UsdLayer> {
        let metadata = self.parse_header()?;
        let mut prims = Vec::new();

        while let Some((_, line)) = self.lines.front() {
            // Stray closing braces at root level
            if line.trim() == "}" {
                self.lines.pop_front();
                continue;
            }
            if let Some(prim) = self.parse_prim("")? {
                prims.push(prim);
            }
        }

        Ok(UsdLayer { metadata, prims })
    }

    /// Parse the `#usda 1.0` header comment and the layer metadata block.
    fn parse_header(&mut self) -> ParseResult<StageMetadata> {
        let mut metadata = StageMetadata::default();

        while let Some((_, line)) = self.lines.front() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                self.lines.pop_front();
            } else {
                break;
            }
        }

        let starts_block = self
            .lines
            .front()
            .is_some_and(|(_, line)| line.trim().starts_with('('));
        if !starts_block {
            return Ok(metadata);
        }

        let mut depth = 0i32;
        let mut tps_authored = false;
        let mut fps = None;
        loop {
            let (line_num, line) = self.lines.pop_front().ok_or(ParseError::UnexpectedEof)?;
            self.current_line = line_num;
            depth += paren_delta(&line);

            let statement = line.trim().trim_start_matches('(').trim_end_matches(')').trim();
            if let Some((key, value)) = statement.split_once('=') {
                let value = value.trim().trim_matches('"');
                match key.trim() {
                    "upAxis" => {
                        metadata.up_axis = if value == "Z" { UpAxis::Z } else { UpAxis::Y };
                    }
                    "metersPerUnit" => metadata.meters_per_unit = parse_number(value)?,
                    "defaultPrim" => metadata.default_prim = Some(value.to_string()),
                    "startTimeCode" => metadata.start_time_code = Some(parse_number(value)?),
                    "endTimeCode" => metadata.end_time_code = Some(parse_number(value)?),
                    "timeCodesPerSecond" => {
                        metadata.time_codes_per_second = parse_number(value)?;
                        tps_authored = true;
                    }
                    "framesPerSecond" => fps = Some(parse_number(value)?),
                    _ => {}
                }
            }

            if depth <= 0 {
                break;
            }
        }

        if let (false, Some(fps)) = (tps_authored, fps) {
            metadata.time_codes_per_second = fps;
        }

        Ok(metadata)
    }

    /// Parse a single prim and its children.
    fn parse_prim(&mut self, parent_path: &str) -> ParseResult<Option<UsdPrim>> {
        // Get next non-empty line
        let (line_num, line) = loop {
            match self.lines.pop_front() {
                Some((num, line)) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() && !trimmed.starts_with('#') {
                        self.current_line = num;
                        break (num, line);
                    }
                }
                None => return Ok(None),
            }
        };

        let trimmed = line.trim();

        // Check for closing brace
        if trimmed == "}" {
            // Put it back for the caller to handle
            self.lines.push_front((line_num, line));
            return Ok(None);
        }

        // Parse prim definition: def Type "Name" { or def Type "Name" (
        if trimmed.starts_with("def ") {
            return self.parse_def(trimmed, parent_path, line_num);
        }

        // over/class blocks and anything else that opens a scope
        if opens_block(trimmed) {
            self.skip_block(line_num)?;
        }

        Ok(None)
    }

    /// Parse a `def Type "Name"` block.
    fn parse_def(
        &mut self,
        line: &str,
        parent_path: &str,
        start_line: usize,
    ) -> ParseResult<Option<UsdPrim>> {
        let rest = line.strip_prefix("def ").unwrap_or(line).trim_start();

        // Typeless `def "Name"` groups its children like a Scope
        let prim_type = if rest.starts_with('"') {
            "Scope"
        } else {
            rest.split_whitespace().next().unwrap_or("")
        };

        let name = quoted(rest).unwrap_or("");

        let path = if parent_path.is_empty() {
            format!("/{}", name)
        } else {
            format!("{}/{}", parent_path, name)
        };

        // Metadata lives in parentheses before any opening brace
        let head = &line[..line.find('{').unwrap_or(line.len())];
        let reference_info = if let Some(paren_start) = head.find('(') {
            if paren_delta(&head[paren_start..]) <= 0 {
                // Inline metadata: def Type "Name" (metadata) { ... }
                let metadata = &head[paren_start..];
                if is_reference_metadata(metadata) {
                    Some(self.parse_reference_line(metadata)?)
                } else {
                    None
                }
            } else {
                // Multi-line metadata started on def line
                self.parse_metadata_lines(paren_delta(&head[paren_start..]))?
            }
        } else if !line.contains('{') {
            // Metadata on the following lines
            self.parse_metadata()?
        } else {
            None
        };

        let has_inline_brace = line.contains('{');
        let has_inline_close = line.contains('}');

        // Whole prim on one line: def Type "Name" (refs) { content }
        if has_inline_brace && has_inline_close {
            if let (Some(brace_start), Some(brace_end)) = (line.find('{'), line.rfind('}')) {
                let inline_content = line[brace_start + 1..brace_end].trim();
                let xform = self.parse_inline_xform_ops(inline_content)?.finish(&path);

                if let Some((asset_path, target_prim_path)) = reference_info {
                    return Ok(Some(UsdPrim::Reference(UsdReference {
                        path,
                        name: name.to_string(),
                        asset_path,
                        target_prim_path,
                        xform,
                        children: Vec::new(),
                    })));
                }

                return Ok(Some(UsdPrim::Xform(UsdXform {
                    path,
                    name: name.to_string(),
                    xform,
                    children: Vec::new(),
                })));
            }
        }

        // Not inline - expect opening brace
        if !has_inline_brace {
            self.expect_opening_brace(start_line)?;
        }

        let is_known = reference_info.is_some()
            || GROUP_TYPES.contains(&prim_type)
            || prim_type == "Mesh"
            || prim_type == "PointInstancer";

        if !is_known {
            log::debug!("Skipping unsupported prim {} ({})", path, prim_type);
            self.skip_block(start_line)?;
            return Ok(Some(UsdPrim::Unknown(prim_type.to_string())));
        }

        let body = self.parse_body(&path, start_line)?;
        let name = name.to_string();

        if let Some((asset_path, target_prim_path)) = reference_info {
            return Ok(Some(UsdPrim::Reference(UsdReference {
                xform: body.xform.finish(&path),
                path,
                name,
                asset_path,
                target_prim_path,
                children: body.children,
            })));
        }

        let prim = match prim_type {
            "Mesh" => UsdPrim::Mesh(UsdMesh {
                xform: body.xform.finish(&path),
                path,
                name,
                points: body.points,
                face_vertex_counts: body.face_vertex_counts,
                face_vertex_indices: body.face_vertex_indices,
                normals: body.normals,
                display_color: body.display_color,
                left_handed: body.left_handed,
            }),
            "PointInstancer" => UsdPrim::PointInstancer(UsdPointInstancer {
                xform: body.xform.finish(&path),
                path,
                name,
                proto_indices: body.proto_indices,
                positions: body.positions,
                orientations: body.orientations,
                scales: body.scales,
                prototypes: body.prototypes,
                children: body.children,
            }),
            _ => UsdPrim::Xform(UsdXform {
                xform: body.xform.finish(&path),
                path,
                name,
                children: body.children,
            }),
        };

        Ok(Some(prim))
    }

    /// Parse metadata in parentheses on the lines following a def.
    /// Returns Some((asset_path, target_prim_path)) if a reference was found.
    fn parse_metadata(&mut self) -> ParseResult<Option<(String, Option<String>)>> {
        let opens = self
            .lines
            .front()
            .is_some_and(|(_, line)| line.trim().starts_with('('));
        if !opens {
            return Ok(None);
        }

        let (line_num, line) = self.lines.pop_front().ok_or(ParseError::UnexpectedEof)?;
        self.current_line = line_num;
        let depth = paren_delta(&line);

        let mut found = if is_reference_metadata(&line) {
            Some(self.parse_reference_line(&line)?)
        } else {
            None
        };

        if depth > 0 {
            if let Some(reference) = self.parse_metadata_lines(depth)? {
                found = Some(reference);
            }
        }

        Ok(found)
    }

    /// Consume metadata lines until the parenthesis depth returns to zero.
    fn parse_metadata_lines(
        &mut self,
        mut depth: i32,
    ) -> ParseResult<Option<(String, Option<String>)>> {
        let mut found = None;

        while depth > 0 {
            let (line_num, line) = self.lines.pop_front().ok_or(ParseError::UnexpectedEof)?;
            self.current_line = line_num;
            depth += paren_delta(&line);

            if found.is_none() && is_reference_metadata(&line) {
                found = Some(self.parse_reference_line(&line)?);
            }
        }

        Ok(found)
    }

    /// Parse a reference line like: references = @./lucy.usda@</Lucy>
    ///
    /// Only the first reference of a list is used.
    fn parse_reference_line(&self, line: &str) -> ParseResult<(String, Option<String>)> {
        let invalid = || ParseError::Parse {
            line: self.current_line,
            message: format!("Invalid reference syntax: {}", line.trim()),
        };

        let start = line.find('@').ok_or_else(invalid)?;
        let len = line[start + 1..].find('@').ok_or_else(invalid)?;
        let asset_path = line[start + 1..start + 1 + len].to_string();

        // Target prim path directly after the closing @
        let after_ref = &line[start + len + 2..];
        let after_ref = &after_ref[..after_ref.find(|c| matches!(c, ',' | ']' | '@')).unwrap_or(after_ref.len())];
        let target_prim = match (after_ref.find('<'), after_ref.find('>')) {
            (Some(open), Some(close)) if open < close => {
                Some(after_ref[open + 1..close].to_string())
            }
            _ => None,
        };

        Ok((asset_path, target_prim))
    }

    /// Parse xformOps from inline content (semicolon separated attributes).
    fn parse_inline_xform_ops(&mut self, content: &str) -> ParseResult<XformCollector> {
        let mut collector = XformCollector::default();

        for part in content.split(';') {
            let part = part.trim();
            if part.contains("xformOpOrder") {
                collector.order = Some(parse_token_list(part));
            } else if let Some(op) = self.parse_xform_op(part)? {
                collector.ops.push(op);
            }
        }

        Ok(collector)
    }

    /// Expect and consume an opening brace.
    fn expect_opening_brace(&mut self, start_line: usize) -> ParseResult<()> {
        // The brace might be on the same line as def, or on the next line
        while let Some((_num, line)) = self.lines.front() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                self.lines.pop_front();
                continue;
            }
            if trimmed == "{" {
                self.lines.pop_front();
            }
            return Ok(());
        }

        Err(ParseError::Parse {
            line: start_line,
            message: "Expected opening brace".to_string(),
        })
    }

    /// Skip a block (consume until matching closing brace).
    fn skip_block(&mut self, start_line: usize) -> ParseResult<()> {
        let mut depth = 1;

        while depth > 0 {
            match self.lines.pop_front() {
                Some((_, line)) => {
                    depth += brace_delta(&line);
                }
                None => return Err(ParseError::UnclosedBlock(start_line)),
            }
        }

        Ok(())
    }

    /// Parse the attributes and child prims of a block up to its closing brace.
    fn parse_body(&mut self, path: &str, start_line: usize) -> ParseResult<PrimBody> {
        let mut body = PrimBody::default();

        loop {
            let (line_num, line) = match self.lines.pop_front() {
                Some(x) => x,
                None => return Err(ParseError::UnclosedBlock(start_line)),
            };
            self.current_line = line_num;

            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if trimmed == "}" {
                break;
            }

            // Child prims first (def lines may contain xformOp text)
            if trimmed.starts_with("def ") {
                self.lines.push_front((line_num, line));
                if let Some(child) = self.parse_prim(path)? {
                    body.children.push(child);
                }
                continue;
            }

            if trimmed.contains("xformOpOrder") {
                let list = if trimmed.contains(']') {
                    trimmed.to_string()
                } else {
                    self.bracketed_body(trimmed)
                };
                body.xform.order = Some(parse_token_list(&list));
                continue;
            }

            if let Some(op) = self.parse_xform_op(trimmed)? {
                body.xform.ops.push(op);
                continue;
            }

            // Animated non-transform attributes are not supported
            if trimmed.contains(".timeSamples") {
                self.skip_value(trimmed, line_num)?;
                continue;
            }

            match attribute_name(trimmed) {
                Some("points") => body.points = self.parse_vec3_array(trimmed),
                Some("faceVertexCounts") => body.face_vertex_counts = self.parse_int_array(trimmed),
                Some("faceVertexIndices") => {
                    body.face_vertex_indices = self.parse_int_array(trimmed)
                }
                Some("normals") | Some("primvars:normals") => {
                    body.normals = Some(self.parse_vec3_array(trimmed))
                }
                Some("primvars:displayColor") => {
                    body.display_color = self.parse_vec3_array(trimmed).first().copied()
                }
                Some("orientation") => {
                    if trimmed.contains("\"leftHanded\"") {
                        body.left_handed = true;
                        log::debug!("Mesh {} uses left-handed winding", path);
                    }
                }
                Some("positions") => body.positions = self.parse_vec3_array(trimmed),
                Some("protoIndices") => body.proto_indices = self.parse_int_array(trimmed),
                Some("orientations") => body.orientations = Some(self.parse_quat_array(trimmed)),
                Some("scales") => body.scales = Some(self.parse_vec3_array(trimmed)),
                Some("prototypes") if trimmed.starts_with("rel ") => {
                    body.prototypes = self.parse_rel_array(trimmed)
                }
                _ => self.skip_value(trimmed, line_num)?,
            }
        }

        Ok(body)
    }

    /// Parse a single xformOp attribute, constant or time-sampled.
    fn parse_xform_op(&mut self, line: &str) -> ParseResult<Option<(String, AnimatedXformOp)>> {
        let Some(start) = line.find("xformOp:") else {
            return Ok(None);
        };
        let Some(eq) = line[start..].find('=').map(|i| start + i) else {
            return Ok(None);
        };

        let full_name = line[start..eq].trim();
        let (name, sampled) = match full_name.strip_suffix(".timeSamples") {
            Some(name) => (name, true),
            None => (full_name, false),
        };
        let value = line[eq + 1..].trim();

        let Some(kind) = OpKind::from_name(name) else {
            log::debug!("Unsupported xformOp {} at line {}", name, self.current_line);
            self.skip_value(line, self.current_line)?;
            return Ok(None);
        };

        if !sampled {
            let op = self.parse_op_value(kind, value)?;
            return Ok(Some((name.to_string(), AnimatedXformOp::Static(op))));
        }

        let body = self.braced_body(value)?;
        let mut samples = Vec::new();
        for entry in split_top_level(&body) {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (time, sample) = entry.split_once(':').ok_or_else(|| ParseError::Parse {
                line: self.current_line,
                message: format!("Expected 'time: value' in time samples, got: {}", entry),
            })?;
            let sample = sample.trim();
            if sample == "None" {
                continue;
            }
            let time: f64 = parse_number(time.trim())?;
            samples.push((time, self.parse_op_value(kind, sample)?));
        }

        Ok(AnimatedXformOp::from_samples(samples).map(|op| (name.to_string(), op)))
    }

    /// Parse the value of one op kind.
    fn parse_op_value(&self, kind: OpKind, text: &str) -> ParseResult<XformOp> {
        let tuples = || parse_tuples(text);
        let expect = |what: &str| ParseError::Parse {
            line: self.current_line,
            message: format!("Expected {} in: {}", what, text),
        };

        Ok(match kind {
            OpKind::RotateX => XformOp::RotateX(parse_number(text.trim_end_matches(','))?),
            OpKind::RotateY => XformOp::RotateY(parse_number(text.trim_end_matches(','))?),
            OpKind::RotateZ => XformOp::RotateZ(parse_number(text.trim_end_matches(','))?),
            OpKind::Translate | OpKind::Scale | OpKind::RotateXYZ => {
                let tuple = tuples()?.into_iter().next().ok_or_else(|| expect("(x, y, z)"))?;
                let [x, y, z] = tuple[..] else {
                    return Err(expect("3 components"));
                };
                let v = Vec3::new(x, y, z);
                match kind {
                    OpKind::Translate => XformOp::Translate(v),
                    OpKind::Scale => XformOp::Scale(v),
                    _ => XformOp::RotateXYZ(v),
                }
            }
            OpKind::Orient => {
                let tuple = tuples()?.into_iter().next().ok_or_else(|| expect("(w, x, y, z)"))?;
                let [w, x, y, z] = tuple[..] else {
                    return Err(expect("4 components"));
                };
                XformOp::Orient(Quat::from_xyzw(x, y, z, w).normalize())
            }
            OpKind::Transform => {
                let rows = tuples()?;
                if rows.len() != 4 || rows.iter().any(|r| r.len() != 4) {
                    return Err(expect("4x4 matrix"));
                }
                // USD matrices are row-major with row vectors; rows become glam columns
                let mut cols = [[0.0f32; 4]; 4];
                for (col, row) in cols.iter_mut().zip(&rows) {
                    col.copy_from_slice(row);
                }
                XformOp::Transform(Mat4::from_cols_array_2d(&cols))
            }
        })
    }

    /// Text between `{` and its matching `}`, reading more lines if needed.
    fn braced_body(&mut self, first: &str) -> ParseResult<String> {
        let start_line = self.current_line;
        let open = first.find('{').ok_or_else(|| ParseError::Parse {
            line: start_line,
            message: format!("Expected '{{' in: {}", first),
        })?;

        let mut content = first[open + 1..].to_string();
        let mut depth = 1 + brace_delta(&content);
        while depth > 0 {
            let (line_num, line) = self
                .lines
                .pop_front()
                .ok_or(ParseError::UnclosedBlock(start_line))?;
            self.current_line = line_num;
            depth += brace_delta(&line);
            content.push(' ');
            content.push_str(&line);
        }

        if let Some(end) = content.rfind('}') {
            content.truncate(end);
        }
        Ok(content)
    }

    /// Consume the rest of an attribute whose value spans several lines.
    fn skip_value(&mut self, line: &str, line_num: usize) -> ParseResult<()> {
        if opens_block(line) {
            return self.skip_block(line_num);
        }
        let value = line.split_once('=').map_or(line, |(_, v)| v);
        if value.contains('[') && !value.contains(']') {
            self.bracketed_body(value);
        }
        Ok(())
    }

    /// Text between `[` (after the `=`) and `]`, reading more lines if needed.
    fn bracketed_body(&mut self, first_line: &str) -> String {
        let eq_pos = first_line.find('=').unwrap_or(0);
        let after_eq = &first_line[eq_pos..];

        let Some(bracket_start) = after_eq.find('[') else {
            return String::new();
        };

        let mut content = after_eq[bracket_start + 1..].to_string();
        if !content.contains(']') {
            while let Some((line_num, line)) = self.lines.pop_front() {
                self.current_line = line_num;
                content.push(' ');
                content.push_str(&line);
                if line.contains(']') {
                    break;
                }
            }
        }

        if let Some(end) = content.find(']') {
            content.truncate(end);
        }
        content
    }

    /// Parse a Vec3 array like [(1, 2, 3), (4, 5, 6), ...].
    fn parse_vec3_array(&mut self, first_line: &str) -> Vec<Vec3> {
        let inner = self.bracketed_body(first_line);
        lenient_tuples(&inner)
            .filter_map(|t| match t[..] {
                [x, y, z] => Some(Vec3::new(x, y, z)),
                _ => None,
            })
            .collect()
    }

    /// Parse an int array like [1, 2, 3, ...].
    fn parse_int_array(&mut self, first_line: &str) -> Vec<i32> {
        self.bracketed_body(first_line)
            .split(',')
            .filter_map(|s| s.trim().parse::<i32>().ok())
            .collect()
    }

    /// Parse a quaternion array like [(1, 0, 0, 0), ...]; USDA writes (real, i, j, k).
    fn parse_quat_array(&mut self, first_line: &str) -> Vec<Quat> {
        let inner = self.bracketed_body(first_line);
        lenient_tuples(&inner)
            .filter_map(|t| match t[..] {
                [w, x, y, z] => Some(Quat::from_xyzw(x, y, z, w).normalize()),
                _ => None,
            })
            .collect()
    }

    /// Parse a relationship target list like [</Path/To/Prim>, ...] or a single </Path>.
    fn parse_rel_array(&mut self, first_line: &str) -> Vec<String> {
        let content = if first_line.contains('[') {
            self.bracketed_body(first_line)
        } else {
            first_line.split_once('=').map_or("", |(_, v)| v).to_string()
        };

        content
            .split('<')
            .skip(1)
            .filter_map(|part| part.split_once('>').map(|(path, _)| path.trim()))
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Parse a USDA string into a layer.
pub fn parse_usda(content: &str) -> ParseResult<UsdLayer> {
    let mut parser = UsdaParser::new(content);
    parser.parse()
}

fn parse_number<T: std::str::FromStr>(text: &str) -> ParseResult<T> {
    text.trim()
        .parse::<T>()
        .map_err(|_| ParseError::InvalidNumber(text.trim().to_string()))
}

/// First double-quoted string in `text`.
fn quoted(text: &str) -> Option<&str> {
    let start = text.find('"')? + 1;
    let len = text[start..].find('"')?;
    Some(&text[start..start + len])
}

/// Attribute name: the last token before `=` (`uniform token[] xformOpOrder` -> `xformOpOrder`).
fn attribute_name(line: &str) -> Option<&str> {
    let lhs = line.split_once('=').map_or(line, |(lhs, _)| lhs);
    lhs.split_whitespace().last()
}

fn is_reference_metadata(line: &str) -> bool {
    (line.contains("references") || line.contains("payload")) && line.contains('@')
}

/// Net change in `(` depth, ignoring quoted text.
fn paren_delta(line: &str) -> i32 {
    delta(line, '(', ')')
}

/// Net change in `{` depth, ignoring quoted text.
fn brace_delta(line: &str) -> i32 {
    delta(line, '{', '}')
}

fn delta(line: &str, open: char, close: char) -> i32 {
    let mut in_string = false;
    let mut depth = 0;
    for c in line.chars() {
        match c {
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// True if the line leaves a `{` scope open.
fn opens_block(line: &str) -> bool {
    brace_delta(line) > 0
}

/// Quoted tokens of a list like `["xformOp:translate", "!invert!xformOp:translate:pivot"]`.
fn parse_token_list(text: &str) -> Vec<String> {
    let list = text.split_once('=').map_or(text, |(_, v)| v);
    list.split('"')
        .skip(1)
        .step_by(2)
        .map(str::to_string)
        .collect()
}

/// Split on commas that are not nested in parentheses.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Innermost parenthesised groups; `((1,0),(0,1))` yields two tuples.
fn tuple_groups(text: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut open = None;
    for (i, c) in text.char_indices() {
        match c {
            '(' => open = Some(i + 1),
            ')' => {
                if let Some(start) = open.take() {
                    groups.push(&text[start..i]);
                }
            }
            _ => {}
        }
    }
    groups
}

/// Strictly parsed tuples: any malformed number is an error.
fn parse_tuples(text: &str) -> ParseResult<Vec<Vec<f32>>> {
    tuple_groups(text)
        .into_iter()
        .map(|group| group.split(',').map(parse_number::<f32>).collect())
        .collect()
}

/// Tuples for bulk arrays: malformed components drop the tuple.
fn lenient_tuples(text: &str) -> impl Iterator<Item = Vec<f32>> + '_ {
    tuple_groups(text).into_iter().filter_map(|group| {
        group
            .split(',')
            .map(|s| s.trim().parse::<f32>().ok())
            .collect::<Option<Vec<_>>>()
    })
}
