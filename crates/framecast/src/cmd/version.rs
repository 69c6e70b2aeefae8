use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("framecast {}", env!("CARGO_PKG_VERSION"));
    if !args.extended {
        return Ok(SUCCESS);
    }

    println!(
        "target: {}",
        option_env!("FRAMECAST_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("os/arch: {}/{}", std::env::consts::OS, std::env::consts::ARCH);
    println!(
        "wire: u32 big-endian length prefix, max payload default {} bytes",
        framecast_frame::DEFAULT_MAX_PAYLOAD
    );
    println!("decoders: png, jpeg");
    println!("features: async={}, cli=true", cfg!(feature = "async"));

    Ok(SUCCESS)
}
