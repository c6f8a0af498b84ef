//! Generate the tanh deployment tables for the embedded runtime.
//!
//! Usage: gen_tanh_table [output_dir]
//!
//! Writes `tanh_table.h` (float) and `tanh_table_S16.h` (Q15) from the same
//! sample set, then reports the approximation error of both evaluation
//! paths against exact tanh.

use std::fs::File;
use std::path::Path;

use denoise_rt::tanh_table::{TableFormat, TanhTable, DEFAULT_DELTA_X, DEFAULT_MAX_X};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let out_dir = args.get(1).map(String::as_str).unwrap_or(".");
    let out_dir = Path::new(out_dir);

    let table = TanhTable::generate(DEFAULT_MAX_X, DEFAULT_DELTA_X)?;
    println!(
        "Table: {} entries, delta_x {}, scale_fac {}",
        table.size(),
        table.delta_x(),
        table.scale_fac()
    );

    let float_path = out_dir.join("tanh_table.h");
    table.write_table_source(&mut File::create(&float_path)?, TableFormat::Float)?;
    println!("Wrote {}", float_path.display());

    let q15_path = out_dir.join("tanh_table_S16.h");
    table.write_table_source(&mut File::create(&q15_path)?, TableFormat::Q15)?;
    println!("Wrote {}", q15_path.display());

    println!("float path: {}", table.validate(1000));
    println!("Q15 path:   {}", table.validate_q15(1000));
    Ok(())
}
