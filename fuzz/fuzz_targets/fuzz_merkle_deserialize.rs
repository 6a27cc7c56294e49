// Copyright (c) 2026 Tributary
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use std::sync::OnceLock;
use tributary::core::merkle::io::deserialize_tree;
use tributary::core::ser::basic::RawBytes;
use tributary::core::ser::{ClassId, ConstructableRegistry, InternalClass};

fn registry() -> &'static ConstructableRegistry {
    static REGISTRY: OnceLock<ConstructableRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let reg = ConstructableRegistry::new();
        reg.register_value(RawBytes::CLASS_ID, RawBytes::construct)
            .unwrap();
        reg.register_internal(
            ClassId(0xA),
            InternalClass {
                version: 1,
                minimum_supported_version: 1,
                child_bounds: |_| (0, 16),
            },
        )
        .unwrap();
        reg.seal();
        reg
    })
}

fuzz_target!(|data: &[u8]| {
    // Bounded by max_nodes; arbitrary bytes must never panic or blow up
    // memory.
    let _ = deserialize_tree(&mut Cursor::new(data), registry(), 256, None);
});
