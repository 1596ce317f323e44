//! 单次读取探测器寄存器，打印升级状态字或原始值。

use clap::Parser;
use domain::DeviceEndpoint;
use gds_decode::{decode_status_word, register_offset};
use gds_protocol::{ModbusClient, ModbusTcpClient, ModbusTcpConfig};
use gds_telemetry::init_tracing;
use tracing::info;

/// 读取气体探测器的保持寄存器
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// 探测器地址
    #[arg(long)]
    address: String,

    /// Modbus TCP 端口
    #[arg(long, default_value_t = 502)]
    port: u16,

    /// 从站号
    #[arg(long, default_value_t = 1)]
    unit: u8,

    /// 厂商文档中的寄存器号（40001 起）
    #[arg(long, default_value_t = 40001)]
    register: u32,

    /// 读取数量
    #[arg(long, default_value_t = 1)]
    count: u16,

    /// 只打印原始值，不解码
    #[arg(long)]
    raw: bool,

    /// 连接与读取超时（毫秒）
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let offset = register_offset(args.register)?;
    let endpoint = DeviceEndpoint::new(args.address.clone())
        .with_port(args.port)
        .with_unit_id(args.unit);
    let config = ModbusTcpConfig {
        connect_timeout_ms: args.timeout_ms,
        read_timeout_ms: args.timeout_ms,
    };

    let mut client = ModbusTcpClient::new(endpoint.clone(), config);
    client.connect().await?;
    info!(
        target: "gds.status",
        endpoint = %endpoint,
        register = args.register,
        count = args.count,
        "status_read_started"
    );
    let result = client.read_holding_registers(offset, args.count).await;
    client.close().await;
    let registers = result?;

    println!(
        "{} register {} x{}: {:?}",
        endpoint, args.register, args.count, registers
    );
    if args.raw {
        return Ok(());
    }

    for (index, value) in registers.iter().enumerate() {
        let status = decode_status_word(std::slice::from_ref(value))?;
        let register = args.register + index as u32;
        println!("Register {} = 0x{:04X}", register, status.raw);
        println!(
            "  upgrade   success={} fail={} running={}",
            status.upgrade_success, status.upgrade_fail, status.upgrading
        );
        println!(
            "  rollback  success={} fail={} running={}",
            status.rollback_success, status.rollback_fail, status.rollbacking
        );
        println!("  error code {}", status.error_code);
    }
    Ok(())
}
