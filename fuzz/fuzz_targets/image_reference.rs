//! Fuzz target for image references and role names.

#![no_main]

use libfuzzer_sys::fuzz_target;
use notary_trust::{ImageRef, Role};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(image) = ImageRef::parse(s) {
        let _ = image.gun();
        // Display output must parse back to the same reference.
        let reparsed = ImageRef::parse(&image.to_string()).expect("display output parses");
        assert_eq!(reparsed, image);
    }

    if let Ok(role) = Role::parse(s) {
        assert_eq!(Role::parse(&role.to_string()).ok(), Some(role));
    }
});
