//! Property-based tests for manifest parsing.

use proptest::prelude::*;

use crate::{ManifestEntry, derive_platform, parse_manifest};

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9.-]{0,9}"
}

fn token() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}"
}

fn digest() -> impl Strategy<Value = String> {
    "[0-9a-f]{64}"
}

proptest! {
    /// OS and arch are the last two segments once `.zip` is stripped.
    #[test]
    fn platform_is_last_two_segments(
        leading in proptest::collection::vec(segment(), 2..5),
        os in token(),
        arch in token(),
        zipped in any::<bool>(),
    ) {
        let mut filename = format!("{}_{}_{}", leading.join("_"), os, arch);
        if zipped {
            filename.push_str(".zip");
        }
        let platform = derive_platform(&filename).unwrap();
        prop_assert_eq!(platform.os, os);
        prop_assert_eq!(platform.arch, arch);
    }

    /// Names with fewer than four segments never produce a platform.
    #[test]
    fn short_names_never_produce_platforms(
        segments in proptest::collection::vec(segment(), 1..4),
        sum in digest(),
    ) {
        let filename = format!("{}.zip", segments.join("_"));
        let manifest = parse_manifest(&format!("{sum}  {filename}\n"));
        prop_assert_eq!(manifest.artifacts().count(), 0);
    }

    /// Lines without exactly two fields are never entries.
    #[test]
    fn wrong_field_counts_are_ignored(
        fields in proptest::collection::vec(segment(), 3..6),
    ) {
        let one_field = fields[0].clone();
        let many_fields = fields.join(" ");
        let manifest = parse_manifest(&format!("{one_field}\n{many_fields}\n"));
        prop_assert!(manifest.is_empty());
        prop_assert_eq!(manifest.ignored().len(), 2);
    }

    /// Entries come out in manifest order with their line numbers.
    #[test]
    fn manifest_order_is_preserved(
        rows in proptest::collection::vec((digest(), token(), token()), 1..10),
    ) {
        let content: String = rows
            .iter()
            .map(|(sum, os, arch)| format!("{sum}  terraform-provider-x_1.0.0_{os}_{arch}.zip\n"))
            .collect();
        let manifest = parse_manifest(&content);

        prop_assert_eq!(manifest.len(), rows.len());
        for (idx, (entry, (sum, os, arch))) in manifest.entries().iter().zip(&rows).enumerate() {
            match entry {
                ManifestEntry::Platform { line, artifact } => {
                    prop_assert_eq!(*line, idx + 1);
                    prop_assert_eq!(&artifact.digest, sum);
                    prop_assert_eq!(&artifact.platform.os, os);
                    prop_assert_eq!(&artifact.platform.arch, arch);
                }
                ManifestEntry::Unparseable { .. } => prop_assert!(false, "unexpected unparseable entry"),
            }
        }
    }
}
