use clap::{Arg, ArgAction, Command};
use std::sync::Arc;
use tokio::sync::watch;

use rustexec::core::config::{ApiKeys, Config, GlobalConfig};
use rustexec::core::exchange::Exchange;
use rustexec::core::types::{OrderResult, OrderSide, PositionSide, StepOutcome, StrategySummary, TimeInForce};
use rustexec::exchanges::BinanceExchange;
use rustexec::strategies::{
    BasicOrderExecutor, GridExecutor, GridParams, OcoExecutor, OcoParams, TwapExecutor, TwapParams,
};

fn build_cli() -> Command {
    Command::new("rustexec")
        .version(env!("CARGO_PKG_VERSION"))
        .about("币安USDT-M合约订单执行工具")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .default_value("config/config.yaml")
                .global(true),
        )
        .arg(
            Arg::new("testnet")
                .long("testnet")
                .help("使用测试网")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("market")
                .about("市价单")
                .arg(Arg::new("symbol").required(true))
                .arg(Arg::new("side").required(true).help("BUY 或 SELL"))
                .arg(
                    Arg::new("quantity")
                        .required(true)
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("reduce-only")
                        .long("reduce-only")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("limit")
                .about("限价单")
                .arg(Arg::new("symbol").required(true))
                .arg(Arg::new("side").required(true).help("BUY 或 SELL"))
                .arg(
                    Arg::new("quantity")
                        .required(true)
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("price")
                        .required(true)
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("time-in-force")
                        .long("time-in-force")
                        .value_name("TIF")
                        .help("GTC/IOC/FOK/GTX")
                        .default_value("GTC"),
                )
                .arg(
                    Arg::new("post-only")
                        .long("post-only")
                        .help("只做maker (GTX)")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("stop-limit")
                .about("止损限价单")
                .arg(Arg::new("symbol").required(true))
                .arg(Arg::new("side").required(true).help("BUY 或 SELL"))
                .arg(
                    Arg::new("quantity")
                        .required(true)
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("stop-price")
                        .required(true)
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("limit-price")
                        .required(true)
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("reduce-only")
                        .long("reduce-only")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("oco")
                .about("OCO模拟: 止盈 + 止损成对挂出")
                .arg(Arg::new("symbol").required(true))
                .arg(
                    Arg::new("position-side")
                        .required(true)
                        .help("LONG 或 SHORT"),
                )
                .arg(
                    Arg::new("quantity")
                        .required(true)
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("take-profit")
                        .required(true)
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("stop-loss")
                        .required(true)
                        .value_parser(clap::value_parser!(f64)),
                ),
        )
        .subcommand(
            Command::new("twap")
                .about("TWAP时间切片执行")
                .arg(Arg::new("symbol").required(true))
                .arg(Arg::new("side").required(true).help("BUY 或 SELL"))
                .arg(
                    Arg::new("total-quantity")
                        .required(true)
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("slices")
                        .long("slices")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("5"),
                )
                .arg(
                    Arg::new("interval")
                        .long("interval")
                        .value_name("SECONDS")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("60"),
                )
                .arg(
                    Arg::new("randomize")
                        .long("randomize")
                        .help("随机扰动切片数量")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("randomize-pct")
                        .long("randomize-pct")
                        .value_parser(clap::value_parser!(f64))
                        .default_value("10.0"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .help("只打印计划，合成成交，不发真实订单")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("grid")
                .about("静态网格挂单")
                .arg(Arg::new("symbol").required(true))
                .arg(
                    Arg::new("lower-price")
                        .required(true)
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("upper-price")
                        .required(true)
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("quantity")
                        .required(true)
                        .help("每层数量")
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("grids")
                        .long("grids")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("cancel")
                .about("撤销单笔订单")
                .arg(Arg::new("symbol").required(true))
                .arg(
                    Arg::new("order-id")
                        .required(true)
                        .value_parser(clap::value_parser!(i64)),
                ),
        )
        .subcommand(
            Command::new("cancel-all")
                .about("撤销某交易对的全部挂单")
                .arg(Arg::new("symbol").required(true)),
        )
        .subcommand(
            Command::new("status")
                .about("查询订单状态")
                .arg(Arg::new("symbol").required(true))
                .arg(
                    Arg::new("order-id")
                        .required(true)
                        .value_parser(clap::value_parser!(i64)),
                ),
        )
}

fn print_order(result: &OrderResult) {
    println!("==================== 订单结果 ====================");
    println!("orderId:       {}", result.order_id);
    if let Some(client_order_id) = &result.client_order_id {
        println!("clientOrderId: {}", client_order_id);
    }
    println!("状态:          {}", result.status);
    println!("已成交数量:    {}", result.executed_qty);
    println!("平均成交价:    {}", result.avg_price);
    println!("==================================================");
}

fn print_summary(summary: &StrategySummary) {
    println!("==================== 执行摘要 ====================");
    println!("策略:        {}", summary.strategy);
    println!("交易对:      {}", summary.symbol);
    println!(
        "步骤:        {} 成功 / {} 失败 / {} 总计",
        summary.steps.len() - summary.failed_count(),
        summary.failed_count(),
        summary.steps.len()
    );
    println!("累计成交量:  {:.6}", summary.total_executed);
    println!("成交均价:    {:.4}", summary.vwap());
    if let (Some(start), Some(end)) = (summary.start_price, summary.end_price) {
        println!("起始价:      {}", start);
        println!("结束价:      {}", end);
    }
    if let Some(change) = summary.price_change_pct() {
        println!("价格变化:    {:.4}%", change);
    }
    for step in &summary.steps {
        if let StepOutcome::Failed { step, error } = step {
            println!("  ⚠️ 第 {} 步失败: {}", step, error);
        }
    }
    println!("==================================================");
}

/// 策略摘要转换为进程退出行为: 部分失败打印原因并以非零退出
fn finish_with_summary(summary: &StrategySummary) {
    print_summary(summary);
    if let Err(e) = summary.as_result() {
        log::error!("{}", e.user_friendly_message());
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载环境变量
    dotenv::dotenv().ok();

    let matches = build_cli().get_matches();

    let config_path = matches.get_one::<String>("config").unwrap();
    let (global_config, config_missing) = match GlobalConfig::from_file(config_path) {
        Ok(config) => (config, false),
        Err(_) => (GlobalConfig::default(), true),
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&global_config.log_level),
    )
    .init();

    if config_missing {
        log::warn!("配置文件 {} 不存在或不可读，使用默认配置", config_path);
    }

    let testnet = matches.get_flag("testnet");
    let config = Config::from_global(&global_config, testnet);
    log::info!(
        "连接 {} ({})",
        config.futures_base_url,
        if config.testnet { "测试网" } else { "主网" }
    );

    let (subcommand, sub_matches) = matches.subcommand().expect("subcommand required");
    let dry_run = sub_matches
        .try_get_one::<bool>("dry-run")
        .ok()
        .flatten()
        .copied()
        .unwrap_or(false);

    // dry-run 只访问公共行情接口，可以没有密钥
    let api_keys = match ApiKeys::from_env() {
        Ok(keys) => keys,
        Err(e) if dry_run => {
            log::warn!("{}，dry-run 模式继续", e);
            ApiKeys::anonymous()
        }
        Err(e) => return Err(e.into()),
    };

    let binance = BinanceExchange::new(config.clone(), api_keys);

    // 连通性预检 + 服务器时间同步
    binance.ping().await?;
    binance.sync_server_time().await?;

    let exchange: Arc<dyn Exchange> = Arc::new(binance);

    // Ctrl+C 转发到停止信号，TWAP 据此提前收尾
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("收到 Ctrl+C，通知策略停止");
            let _ = shutdown_tx.send(true);
        }
    });

    match subcommand {
        "market" => {
            let executor = BasicOrderExecutor::new(exchange, config);
            let result = executor
                .execute_market_order(
                    sub_matches.get_one::<String>("symbol").unwrap(),
                    sub_matches.get_one::<String>("side").unwrap().parse()?,
                    *sub_matches.get_one::<f64>("quantity").unwrap(),
                    sub_matches.get_flag("reduce-only"),
                )
                .await?;
            print_order(&result);
        }
        "limit" => {
            let executor = BasicOrderExecutor::new(exchange, config);
            let tif: TimeInForce = sub_matches
                .get_one::<String>("time-in-force")
                .unwrap()
                .parse()?;
            let result = executor
                .execute_limit_order(
                    sub_matches.get_one::<String>("symbol").unwrap(),
                    sub_matches.get_one::<String>("side").unwrap().parse()?,
                    *sub_matches.get_one::<f64>("quantity").unwrap(),
                    *sub_matches.get_one::<f64>("price").unwrap(),
                    tif,
                    sub_matches.get_flag("post-only"),
                )
                .await?;
            print_order(&result);
        }
        "stop-limit" => {
            let executor = BasicOrderExecutor::new(exchange, config);
            let result = executor
                .execute_stop_limit_order(
                    sub_matches.get_one::<String>("symbol").unwrap(),
                    sub_matches.get_one::<String>("side").unwrap().parse()?,
                    *sub_matches.get_one::<f64>("quantity").unwrap(),
                    *sub_matches.get_one::<f64>("stop-price").unwrap(),
                    *sub_matches.get_one::<f64>("limit-price").unwrap(),
                    sub_matches.get_flag("reduce-only"),
                )
                .await?;
            print_order(&result);
        }
        "oco" => {
            let position_side: PositionSide = sub_matches
                .get_one::<String>("position-side")
                .unwrap()
                .parse()?;
            let params = OcoParams {
                symbol: sub_matches.get_one::<String>("symbol").unwrap().clone(),
                position_side,
                quantity: *sub_matches.get_one::<f64>("quantity").unwrap(),
                take_profit_price: *sub_matches.get_one::<f64>("take-profit").unwrap(),
                stop_loss_price: *sub_matches.get_one::<f64>("stop-loss").unwrap(),
            };
            let executor = OcoExecutor::new(exchange, config);
            let outcome = executor.execute(&params).await?;

            println!("==================== OCO 结果 ====================");
            println!("交易对:    {}", outcome.symbol);
            println!("持仓方向:  {}", outcome.position_side);
            println!("数量:      {}", outcome.quantity);
            if let Some(price) = outcome.current_price {
                println!("当前价:    {}", price);
            }
            println!("止盈单:    orderId {}", outcome.take_profit.order_id);
            println!("止损单:    orderId {}", outcome.stop_loss.order_id);
            println!("==================================================");
        }
        "twap" => {
            let side: OrderSide = sub_matches.get_one::<String>("side").unwrap().parse()?;
            let params = TwapParams {
                symbol: sub_matches.get_one::<String>("symbol").unwrap().clone(),
                side,
                total_quantity: *sub_matches.get_one::<f64>("total-quantity").unwrap(),
                num_slices: *sub_matches.get_one::<usize>("slices").unwrap(),
                interval_secs: *sub_matches.get_one::<u64>("interval").unwrap(),
                randomize: sub_matches.get_flag("randomize"),
                randomize_pct: *sub_matches.get_one::<f64>("randomize-pct").unwrap(),
                dry_run,
            };
            let executor = TwapExecutor::new(exchange, config, shutdown_rx);
            let summary = executor.execute(&params).await?;
            finish_with_summary(&summary);
        }
        "grid" => {
            let params = GridParams {
                symbol: sub_matches.get_one::<String>("symbol").unwrap().clone(),
                lower_price: *sub_matches.get_one::<f64>("lower-price").unwrap(),
                upper_price: *sub_matches.get_one::<f64>("upper-price").unwrap(),
                num_grids: *sub_matches.get_one::<usize>("grids").unwrap(),
                quantity_per_grid: *sub_matches.get_one::<f64>("quantity").unwrap(),
                dry_run,
            };
            let executor = GridExecutor::new(exchange, config);
            let summary = executor.setup(&params).await?;
            finish_with_summary(&summary);
        }
        "cancel" => {
            let symbol = sub_matches.get_one::<String>("symbol").unwrap();
            let order_id = *sub_matches.get_one::<i64>("order-id").unwrap();
            let result = exchange.cancel_order(symbol, order_id).await?;
            print_order(&result);
        }
        "cancel-all" => {
            let symbol = sub_matches.get_one::<String>("symbol").unwrap();
            let count = exchange.cancel_all_orders(symbol).await?;
            println!("已撤销 {} 的全部挂单，共 {} 笔", symbol, count);
        }
        "status" => {
            let symbol = sub_matches.get_one::<String>("symbol").unwrap();
            let order_id = *sub_matches.get_one::<i64>("order-id").unwrap();
            let result = exchange.get_order(symbol, order_id).await?;
            print_order(&result);
        }
        other => unreachable!("未知子命令: {}", other),
    }

    Ok(())
}
