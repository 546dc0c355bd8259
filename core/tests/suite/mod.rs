mod dispatcher_host;
mod idle_value;
