// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::{Path, PathBuf};

use crate::Result;

const ARENA_PREFIX: &str = "arena_";
const ARENA_EXTENSION: &str = "dat";
const INDEX_PREFIX: &str = "index";

/// Generates an arena file name: `arena_NNNNNNNNNNNNNNNNNNNN.dat`.
///
/// Zero padding keeps lexical and numeric order identical.
pub fn arena_file_name(aid: u64) -> String { format!("{ARENA_PREFIX}{aid:020}.{ARENA_EXTENSION}") }

/// Returns full path to an arena file: `base/arena_NNNN.dat`.
pub fn arena_file_path<P: AsRef<Path>>(base: P, aid: u64) -> PathBuf {
    base.as_ref().join(arena_file_name(aid))
}

/// Returns full path to an index slot file: `base/index.<slot>`.
pub fn index_slot_path<P: AsRef<Path>>(base: P, slot: u8) -> PathBuf {
    base.as_ref().join(format!("{INDEX_PREFIX}.{slot}"))
}

/// Parses an arena id back out of a file name produced by
/// [`arena_file_name`].
pub fn parse_arena_file_name(name: &str) -> Option<u64> {
    name.strip_prefix(ARENA_PREFIX)?
        .strip_suffix(ARENA_EXTENSION)?
        .strip_suffix('.')?
        .parse()
        .ok()
}

/// Scans the queue directory for arena files, sorted by arena id.
pub fn scan_arena_files<P: AsRef<Path>>(base: P) -> Result<Vec<(u64, PathBuf)>> {
    let base = base.as_ref();
    let mut files = Vec::new();
    if !base.exists() {
        return Ok(files);
    }

    for entry in std::fs::read_dir(base)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(aid) = path
            .file_name()
            .and_then(|s| s.to_str())
            .and_then(parse_arena_file_name)
        {
            files.push((aid, path));
        }
    }

    files.sort_unstable_by_key(|(aid, _)| *aid);
    Ok(files)
}
