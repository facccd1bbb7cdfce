
mod redirects;
mod ring_routing;
