#![no_main]

use libfuzzer_sys::fuzz_target;
use scenesync_wire::SyncMessage;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(message) = SyncMessage::decode(text) else {
        return;
    };

    // anything that decodes and is encodable must survive a second trip
    if let Ok(encoded) = message.encode() {
        let again = SyncMessage::decode(&encoded).expect("re-encoded frame must decode");
        assert_eq!(again, message);
    }
});
