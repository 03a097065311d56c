// Copyright 2025 The Weft Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Buffer configuration.

use serde::{Deserialize, Serialize};

use weft_unicode::WidthMethod;

/// Settings fixed at buffer creation. Wrap settings deliberately live on
/// the view, not here.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    pub tab_width: usize,
    #[serde(with = "width_method_serde")]
    pub width_method: WidthMethod,
    pub max_undo_depth: usize,
}

impl Default for BufferConfig {
    fn default() -> BufferConfig {
        BufferConfig {
            tab_width: 4,
            width_method: WidthMethod::Unicode,
            max_undo_depth: weft_rope::DEFAULT_MAX_UNDO_DEPTH,
        }
    }
}

mod width_method_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use weft_unicode::WidthMethod;

    #[derive(Deserialize, Serialize)]
    #[serde(rename_all = "snake_case")]
    enum Repr {
        Unicode,
        Wcwidth,
    }

    pub fn serialize<S: Serializer>(m: &WidthMethod, s: S) -> Result<S::Ok, S::Error> {
        let repr = match m {
            WidthMethod::Unicode => Repr::Unicode,
            WidthMethod::WcWidth => Repr::Wcwidth,
        };
        repr.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<WidthMethod, D::Error> {
        Ok(match Repr::deserialize(d)? {
            Repr::Unicode => WidthMethod::Unicode,
            Repr::Wcwidth => WidthMethod::WcWidth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BufferConfig::default();
        assert_eq!(config.tab_width, 4);
        assert_eq!(config.width_method, WidthMethod::Unicode);
    }

    #[test]
    fn deserializes_partial_config() {
        let config: BufferConfig =
            serde_json::from_str(r#"{"tab_width": 8, "width_method": "wcwidth"}"#).unwrap();
        assert_eq!(config.tab_width, 8);
        assert_eq!(config.width_method, WidthMethod::WcWidth);
    }
}
