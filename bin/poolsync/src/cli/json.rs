// This file is part of Poolsync.
//
// Poolsync is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Poolsync is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Poolsync.
// If not, see https://www.gnu.org/licenses/.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::Context;
use serde::de::DeserializeOwned;

/// Reads and deserializes a JSON config file from a local path.
pub fn get_json_config<T>(path: impl AsRef<Path>) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("should open {}", path.display()))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).with_context(|| format!("should parse {}", path.display()))
}
