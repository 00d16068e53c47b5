use std::time::{Duration, SystemTime};

use tuntap_poll::{BoxError, DeviceBuilder, Layer};

// Echoes every frame of a TAP interface back to the kernel, reporting idle
// seconds through the read deadline.
fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    let dev = DeviceBuilder::new()
        .name(std::env::args().nth(1).unwrap_or_default())
        .layer(Layer::L2)
        .build()?;
    println!("name = {}", dev.name());

    let mut buf = [0; 65535];
    let mut idle = 0;
    loop {
        dev.set_read_deadline(Some(SystemTime::now() + Duration::from_secs(1)))?;
        match dev.recv(&mut buf) {
            Ok(amount) => {
                idle = 0;
                dev.set_write_deadline(Some(SystemTime::now() + Duration::from_millis(100)))?;
                dev.send(&buf[..amount])?;
            }
            Err(err) if err.is_timeout() => {
                idle += 1;
                println!("idle {idle}s");
                if idle == 30 {
                    break;
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
    dev.close()?;
    Ok(())
}
