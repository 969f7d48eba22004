// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `{{key}}` placeholder templates.

use std::collections::HashMap;

use crate::error::{ResolveError, Result};

/// Maximum nesting of templates referencing templates.
pub const MAX_TEMPLATE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
	Literal(&'a str),
	Placeholder(&'a str),
}

pub fn parse(template: &str) -> Result<Vec<Segment<'_>>> {
	let mut segments = Vec::new();
	let mut rest = template;
	while let Some(start) = rest.find("{{") {
		if start > 0 {
			segments.push(Segment::Literal(&rest[..start]));
		}
		let after = &rest[start + 2..];
		let end = after
			.find("}}")
			.ok_or_else(|| ResolveError::mismatch("template", "unclosed placeholder"))?;
		let name = after[..end].trim();
		if !is_placeholder_name(name) {
			return Err(ResolveError::mismatch(
				"template",
				format!("invalid placeholder '{name}'"),
			));
		}
		segments.push(Segment::Placeholder(name));
		rest = &after[end + 2..];
	}
	if !rest.is_empty() {
		segments.push(Segment::Literal(rest));
	}
	Ok(segments)
}

/// Distinct placeholder names in order of first appearance.
pub fn placeholders<'a>(segments: &[Segment<'a>]) -> Vec<&'a str> {
	let mut names: Vec<&str> = Vec::new();
	for segment in segments {
		if let Segment::Placeholder(name) = segment {
			if !names.contains(name) {
				names.push(*name);
			}
		}
	}
	names
}

/// Substitutes every placeholder; all names must be present in `values`.
pub fn render(segments: &[Segment<'_>], values: &HashMap<&str, String>) -> Result<String> {
	let mut out = String::new();
	for segment in segments {
		match segment {
			Segment::Literal(text) => out.push_str(text),
			Segment::Placeholder(name) => {
				let value = values.get(name).ok_or_else(|| {
					ResolveError::mismatch("template", format!("no value for '{name}'"))
				})?;
				out.push_str(value);
			}
		}
	}
	Ok(out)
}

fn is_placeholder_name(name: &str) -> bool {
	!name.is_empty()
		&& name
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_literals_and_placeholders() {
		let segments = parse("postgres://{{ db_host }}:{{db_port}}/app").unwrap();
		assert_eq!(
			segments,
			vec![
				Segment::Literal("postgres://"),
				Segment::Placeholder("db_host"),
				Segment::Literal(":"),
				Segment::Placeholder("db_port"),
				Segment::Literal("/app"),
			]
		);
	}

	#[test]
	fn rejects_malformed_placeholders() {
		assert!(parse("{{open").is_err());
		assert!(parse("{{}}").is_err());
		assert!(parse("{{a b}}").is_err());
	}

	#[test]
	fn placeholders_are_deduplicated() {
		let segments = parse("{{a}}-{{b}}-{{a}}").unwrap();
		assert_eq!(placeholders(&segments), vec!["a", "b"]);
	}

	#[test]
	fn render_substitutes_values() {
		let segments = parse("{{host}}:{{port}}").unwrap();
		let values = HashMap::from([("host", "db".to_string()), ("port", "5432".to_string())]);
		assert_eq!(render(&segments, &values).unwrap(), "db:5432");

		let partial = HashMap::from([("host", "db".to_string())]);
		assert!(render(&segments, &partial).is_err());
	}

	#[test]
	fn plain_text_is_one_literal() {
		assert_eq!(parse("no braces").unwrap(), vec![Segment::Literal("no braces")]);
		assert!(parse("").unwrap().is_empty());
	}
}
