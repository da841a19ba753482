//! Property-based tests for entry path validation and command expansion.
//!
//! These tests use proptest to generate arbitrary inputs and verify
//! the safety and substitution properties hold across a wide range of cases.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use caxa_core::CommandRunner;
use caxa_core::CommandTemplate;
use caxa_core::StubError;
use caxa_core::command::expand_part;
use caxa_core::copy::CopyBuffer;
use caxa_core::copy::copy_with_buffer;
use caxa_core::extraction::path::validate_entry_path;
use proptest::prelude::*;
use std::io::Cursor;
use std::path::Path;
use std::path::PathBuf;

proptest! {
    /// Any path with a `..` segment should be rejected.
    #[test]
    fn prop_parent_traversal_rejected(
        prefix in "([a-z]+/){0,5}",
        suffix in "([a-z]+/?){0,5}"
    ) {
        let path = format!("{prefix}../{suffix}");
        let result = validate_entry_path(path.as_bytes());
        prop_assert!(
            matches!(result, Err(StubError::UnsafePath { .. })),
            "path with .. should be rejected: {path}"
        );
    }

    /// Absolute paths should be rejected.
    #[test]
    fn prop_absolute_paths_rejected(
        components in prop::collection::vec("[a-z0-9]{1,10}", 0..5)
    ) {
        let path = format!("/{}", components.join("/"));
        prop_assert!(validate_entry_path(path.as_bytes()).is_err());
    }

    /// A backslash anywhere should be rejected, whatever the host separator.
    #[test]
    fn prop_backslash_rejected(
        before in "[a-z]{0,10}",
        after in "[a-z]{0,10}"
    ) {
        let path = format!("{before}\\{after}");
        prop_assert!(validate_entry_path(path.as_bytes()).is_err());
    }

    /// Valid relative paths without special components should be accepted
    /// unchanged.
    #[test]
    fn prop_valid_relative_paths_accepted(
        components in prop::collection::vec("[a-zA-Z0-9_.-]{1,20}", 1..5)
    ) {
        prop_assume!(components.iter().all(|c| c != "." && c != ".."));
        let joined = components.join("/");
        let path = validate_entry_path(joined.as_bytes()).expect("valid path");
        prop_assert_eq!(path, components.iter().collect::<PathBuf>());
    }

    /// Accepted paths never escape the destination when joined onto it.
    #[test]
    fn prop_accepted_paths_stay_inside(raw in "[a-z./\\\\]{1,30}") {
        if let Ok(path) = validate_entry_path(raw.as_bytes()) {
            let destination = Path::new("/destination");
            let joined = destination.join(&path);
            prop_assert!(joined.starts_with(destination));
            prop_assert!(!path.is_absolute());
            prop_assert!(path.components().all(|c| matches!(c, std::path::Component::Normal(_))));
        }
    }

    /// Every placeholder occurrence is replaced with the same directory.
    #[test]
    fn prop_every_placeholder_replaced(
        pieces in prop::collection::vec("[a-z/ :=-]{0,8}", 1..6),
        spaces in prop::collection::vec((" {0,3}", " {0,3}"), 5),
        directory in "/[a-z0-9]{1,12}(/[a-z0-9]{1,12}){0,3}"
    ) {
        let mut part = pieces[0].clone();
        let mut expected = pieces[0].clone();
        for (piece, (left, right)) in pieces[1..].iter().zip(&spaces) {
            part.push_str(&format!("{{{{{left}caxa{right}}}}}{piece}"));
            expected.push_str(&directory);
            expected.push_str(piece);
        }

        let expanded = expand_part(&part, Path::new(&directory));
        prop_assert_eq!(expanded.to_str().unwrap(), expected.as_str());
    }

    /// Trailing arguments are forwarded unchanged, after the template.
    #[test]
    fn prop_trailing_arguments_forwarded(
        trailing in prop::collection::vec("[ -~]{0,16}", 0..6)
    ) {
        let template = CommandTemplate::new(vec![
            "node".to_string(),
            "{{caxa}}/index.js".to_string(),
        ]).unwrap();
        let runner = CommandRunner::new(
            &template,
            Path::new("/app"),
            trailing.iter().map(Into::into),
        );
        prop_assert_eq!(runner.arguments().len(), trailing.len() + 1);
        prop_assert_eq!(runner.arguments()[0].to_str().unwrap(), "/app/index.js");
        for (forwarded, original) in runner.arguments()[1..].iter().zip(&trailing) {
            prop_assert_eq!(forwarded.to_str().unwrap(), original.as_str());
        }
    }

    /// Copy should preserve data exactly.
    #[test]
    fn prop_copy_preserves_data(
        data in prop::collection::vec(any::<u8>(), 0..200_000)
    ) {
        let mut buffer = CopyBuffer::new();
        let mut output = Vec::new();
        let copied = copy_with_buffer(&mut Cursor::new(&data), &mut output, &mut buffer)
            .expect("copy should succeed");
        prop_assert_eq!(copied, data.len() as u64);
        prop_assert_eq!(output, data);
    }
}
