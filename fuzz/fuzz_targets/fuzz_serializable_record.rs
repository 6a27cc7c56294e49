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
use tributary::core::ser::basic::RawBytes;
use tributary::core::ser::{
    read_serializable, read_serializable_list, ConstructableRegistry,
};

fn registry() -> &'static ConstructableRegistry {
    static REGISTRY: OnceLock<ConstructableRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let reg = ConstructableRegistry::new();
        reg.register_value(RawBytes::CLASS_ID, RawBytes::construct)
            .unwrap();
        reg.seal();
        reg
    })
}

fuzz_target!(|data: &[u8]| {
    let reg = registry();
    for debug in [false, true] {
        let _ = read_serializable(&mut Cursor::new(data), reg, debug);
        let _ = read_serializable_list(&mut Cursor::new(data), reg, 128, debug);
    }
});
