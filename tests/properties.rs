//! Property tests: randomized inputs protecting the id-slug and
//! strip/insert invariants.

use proptest::prelude::*;

use lupack::bundler::{strip_generated, BLOCK_END, BLOCK_START};
use lupack::generate_id;

proptest! {
    #[test]
    fn generate_id_is_deterministic(resource in ".{0,64}", version in ".{0,16}") {
        prop_assert_eq!(
            generate_id(&resource, &version),
            generate_id(&resource, &version)
        );
    }

    #[test]
    fn generate_id_is_filesystem_safe(resource in ".{0,64}", version in ".{0,16}") {
        let id = generate_id(&resource, &version);
        prop_assert!(!id.contains('/'));
        prop_assert!(!id.contains('\\'));
        prop_assert!(!id.contains(':'));
        prop_assert!(!id.contains('*'));
        prop_assert!(!id.contains('?'));
        prop_assert!(!id.contains('<'));
        prop_assert!(!id.contains('>'));
        prop_assert!(!id.contains('|'));
        prop_assert!(!id.contains(' '));
        prop_assert!(!id.contains('\t'));
        prop_assert!(!id.contains('\0'));
        prop_assert!(!id.ends_with('.'));
    }

    #[test]
    fn strip_recovers_user_content_around_generated_block(
        before in "[^\\-]{0,128}",
        block in ".{0,256}",
        after in "[^\\-]{0,128}",
    ) {
        prop_assume!(!block.contains(BLOCK_START));
        prop_assume!(!block.contains(BLOCK_END.trim_end()));

        let assembled = format!("{before}{BLOCK_START}{block}\n{BLOCK_END}{after}");
        let stripped = strip_generated(&assembled, std::path::Path::new("t.lua"))
            .expect("well-formed block strips");
        prop_assert_eq!(stripped, format!("{before}{after}"));
    }

    #[test]
    fn strip_without_markers_never_changes_content(content in "[^\\-]{0,256}") {
        let stripped = strip_generated(&content, std::path::Path::new("t.lua"))
            .expect("marker-free content is untouched");
        prop_assert_eq!(stripped, content);
    }
}
