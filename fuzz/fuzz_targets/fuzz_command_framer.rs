#![no_main]
use libfuzzer_sys::fuzz_target;

use ears_core::{Command, CommandFramer, Decoded};

fuzz_target!(|data: &[u8]| {
    let mut framer = CommandFramer::default();
    for &byte in data {
        match framer.push(byte) {
            Decoded::Command(cmd) => {
                // Re-encoding and decoding again yields the same command,
                // and so does the text form.
                let mut wire = Vec::new();
                cmd.encode(&mut wire);
                let mut again = CommandFramer::default();
                let last = wire.iter().map(|&b| again.push(b)).last();
                assert_eq!(last, Some(Decoded::Command(cmd)));
                assert_eq!(cmd.to_string().parse::<Command>(), Ok(cmd));
            }
            Decoded::Pending => assert!(framer.is_pending()),
            Decoded::Unknown(_) => assert!(!framer.is_pending()),
        }
    }
});
