use crate::cli::commands::StopArgs;
use crate::container::DockerRuntime;
use crate::errors::DastError;
use tracing::info;

pub async fn handle_stop(args: StopArgs) -> Result<(), DastError> {
    let runtime = DockerRuntime::for_container(&args.container)?;
    info!(container = %runtime.container_name(), remove = args.remove, "Stopping engine container");
    runtime.stop_container(args.remove).await?;
    if args.remove {
        println!("Container {} stopped and removed", runtime.container_name());
    } else {
        println!("Container {} stopped", runtime.container_name());
    }
    Ok(())
}
