use std::sync::LazyLock;

use regex::Regex;

use crate::services::LicenseDetector;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("unable to compile whitespace regex"));

/// Identifies common open source licenses by distinctive phrases of their
/// text.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordLicenseDetector;

struct Rule {
    spdx: &'static str,
    all_of: &'static [&'static str],
}

// More specific licenses come first.
const RULES: &[Rule] = &[
    Rule {
        spdx: "AGPL-3.0",
        all_of: &["gnu affero general public license", "version 3"],
    },
    Rule {
        spdx: "LGPL-3.0",
        all_of: &["gnu lesser general public license", "version 3"],
    },
    Rule {
        spdx: "LGPL-2.1",
        all_of: &["gnu lesser general public license", "version 2.1"],
    },
    Rule {
        spdx: "GPL-3.0",
        all_of: &["gnu general public license", "version 3"],
    },
    Rule {
        spdx: "GPL-2.0",
        all_of: &["gnu general public license", "version 2"],
    },
    Rule {
        spdx: "Apache-2.0",
        all_of: &["apache license", "version 2.0"],
    },
    Rule {
        spdx: "MPL-2.0",
        all_of: &["mozilla public license", "2.0"],
    },
    Rule {
        spdx: "BSD-3-Clause",
        all_of: &[
            "redistribution and use in source and binary forms",
            "neither the name",
        ],
    },
    Rule {
        spdx: "BSD-2-Clause",
        all_of: &["redistribution and use in source and binary forms"],
    },
    Rule {
        spdx: "MIT",
        all_of: &["permission is hereby granted, free of charge"],
    },
    Rule {
        spdx: "ISC",
        all_of: &["permission to use, copy, modify, and/or distribute this software"],
    },
    Rule {
        spdx: "Unlicense",
        all_of: &["this is free and unencumbered software released into the public domain"],
    },
];

impl LicenseDetector for KeywordLicenseDetector {
    fn detect(&self, data: &[u8]) -> String {
        let text = String::from_utf8_lossy(data).to_lowercase();
        let text = WHITESPACE.replace_all(&text, " ");

        RULES
            .iter()
            .find(|rule| rule.all_of.iter().all(|phrase| text.contains(phrase)))
            .map(|rule| rule.spdx.to_string())
            .unwrap_or_default()
    }
}
