use std::env;
use std::fs::File;
use std::io::prelude::*;
use std::process;

use gruecore::memory::MemoryBuffer;
use gruecore::processor::Processor;
use gruecore::ui_stdio::StdioUi;

fn main() {
    env_logger::init();

    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: gruecore <story-file>");
            process::exit(2);
        }
    };

    let mut all_bytes = Vec::new();
    match File::open(&path).and_then(|mut f| f.read_to_end(&mut all_bytes)) {
        Ok(_) => {}
        Err(e) => {
            eprintln!("cannot read {path}: {e}");
            process::exit(2);
        }
    }

    let mut processor = match Processor::new(MemoryBuffer::new(all_bytes), StdioUi::new()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("cannot load {path}: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = processor.execute() {
        eprintln!("\nfatal: {e}");
        process::exit(1);
    }
}
