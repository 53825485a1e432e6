pub mod iperf3_routes;
